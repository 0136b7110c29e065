use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_postgres::{
    AsyncMessage, Config, NoTls, Notification, SimpleQueryMessage, SimpleQueryRow,
};
use ulid::Ulid;

use aula::catalog::SlotCatalog;
use aula::tenant::TenantManager;
use aula::wire;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> (SocketAddr, Arc<TenantManager>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("aula_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let tm = Arc::new(TenantManager::new(
        dir,
        1000,
        Arc::new(SlotCatalog::school_week()),
    ));

    let tm2 = tm.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let tm = tm2.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, tm, "aula".to_string(), None).await;
            });
        }
    });

    (addr, tm)
}

async fn connect_db(
    addr: SocketAddr,
    dbname: &str,
) -> (
    tokio_postgres::Client,
    mpsc::UnboundedReceiver<Notification>,
) {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname(dbname)
        .user("aula")
        .password("aula");

    let (client, mut connection) = config.connect(NoTls).await.unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let stream = stream::poll_fn(move |cx| connection.poll_message(cx));
        futures::pin_mut!(stream);
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(AsyncMessage::Notification(n)) => {
                    let _ = tx.send(n);
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    (client, rx)
}

async fn connect(
    addr: SocketAddr,
) -> (
    tokio_postgres::Client,
    mpsc::UnboundedReceiver<Notification>,
) {
    connect_db(addr, "test").await
}

/// Wait for a notification with timeout.
async fn recv_notification(
    rx: &mut mpsc::UnboundedReceiver<Notification>,
    timeout: Duration,
) -> Option<Notification> {
    tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
}

/// Queued notifications are written out at the next statement boundary.
/// Give the forwarder a moment to run, then nudge the connection with a
/// throwaway query so anything pending gets flushed.
async fn poll_notifications(client: &tokio_postgres::Client) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.simple_query("SELECT * FROM slots").await.unwrap();
}

fn data_rows(messages: Vec<SimpleQueryMessage>) -> Vec<SimpleQueryRow> {
    messages
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

async fn select_rows(client: &tokio_postgres::Client, sql: &str) -> Vec<SimpleQueryRow> {
    data_rows(client.simple_query(sql).await.unwrap())
}

// ── Schedule and request lifecycle ───────────────────────────

#[tokio::test]
async fn connect_and_query() {
    let (addr, _tm) = start_test_server().await;
    let (client, _rx) = connect(addr).await;

    let rid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO rooms (id, building, name) VALUES ('{rid}', 'Science Wing', '204')"
        ))
        .await
        .unwrap();

    let rows = select_rows(&client, "SELECT * FROM rooms").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("building"), Some("Science Wing"));
    assert_eq!(rows[0].get("name"), Some("204"));
}

#[tokio::test]
async fn slot_catalog_is_served() {
    let (addr, _tm) = start_test_server().await;
    let (client, _rx) = connect(addr).await;

    let rows = select_rows(&client, "SELECT * FROM slots").await;
    assert_eq!(rows.len(), 10);
    // Catalog order: periods first, administrative blocks after.
    assert_eq!(rows[0].get("label"), Some("Period 1"));
    assert_eq!(rows[0].get("category"), Some("classroom"));
    assert_eq!(rows[9].get("category"), Some("administrative"));

    let admin =
        select_rows(&client, "SELECT * FROM slots WHERE category = 'administrative'").await;
    assert_eq!(admin.len(), 2);
}

#[tokio::test]
async fn request_lifecycle_end_to_end() {
    let (addr, _tm) = start_test_server().await;
    let (client, _rx) = connect(addr).await;

    let rid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO rooms (id, building, name) VALUES ('{rid}', 'Science Wing', '204')"
        ))
        .await
        .unwrap();

    // Chess club wants periods 1-2 on three consecutive Mondays.
    let qid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO requests (id, room_id, requested_by, requester_role, base_date, \
             start_slot, end_slot, weeks, course) \
             VALUES ('{qid}', '{rid}', 'm.rivera', 'teacher', '2024-03-04', 1, 2, 3, 'Chess Club')"
        ))
        .await
        .unwrap();

    // Creation writes nothing to the stored schedule.
    let grid_sql = format!(
        "SELECT * FROM schedule WHERE room_id = '{rid}' \
         AND date >= '2024-03-04' AND date <= '2024-03-18'"
    );
    let rows = select_rows(&client, &grid_sql).await;
    assert!(rows.iter().all(|r| r.get("status") != Some("occupied")));

    client
        .batch_execute(&format!(
            "UPDATE requests SET status = 'approved', reviewed_by = 'principal.vega', \
             reviewer_role = 'admin' WHERE id = '{qid}'"
        ))
        .await
        .unwrap();

    // 2 slots x 3 weeks = 6 occupied cells, all carrying the back-reference.
    let rows = select_rows(&client, &grid_sql).await;
    let occupied: Vec<_> = rows
        .iter()
        .filter(|r| r.get("status") == Some("occupied"))
        .collect();
    assert_eq!(occupied.len(), 6);
    let qid_str = qid.to_string();
    for row in &occupied {
        assert_eq!(row.get("booked_by"), Some("m.rivera"));
        assert_eq!(row.get("course"), Some("Chess Club"));
        assert_eq!(row.get("request_id"), Some(qid_str.as_str()));
    }
    let mut cells: Vec<(String, String)> = occupied
        .iter()
        .map(|r| {
            (
                r.get("date").unwrap().to_string(),
                r.get("slot").unwrap().to_string(),
            )
        })
        .collect();
    cells.sort();
    assert_eq!(
        cells,
        vec![
            ("2024-03-04".to_string(), "1".to_string()),
            ("2024-03-04".to_string(), "2".to_string()),
            ("2024-03-11".to_string(), "1".to_string()),
            ("2024-03-11".to_string(), "2".to_string()),
            ("2024-03-18".to_string(), "1".to_string()),
            ("2024-03-18".to_string(), "2".to_string()),
        ]
    );

    let req = select_rows(
        &client,
        &format!("SELECT * FROM requests WHERE id = '{qid}'"),
    )
    .await;
    assert_eq!(req.len(), 1);
    assert_eq!(req[0].get("status"), Some("approved"));
    assert_eq!(req[0].get("reviewed_by"), Some("principal.vega"));
}

#[tokio::test]
async fn approval_conflict_leaves_request_pending() {
    let (addr, _tm) = start_test_server().await;
    let (client, _rx) = connect(addr).await;

    let rid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO rooms (id, building, name) VALUES ('{rid}', 'Science Wing', '204')"
        ))
        .await
        .unwrap();

    // The cells are free when the request is filed.
    let qid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO requests (id, room_id, requested_by, requester_role, base_date, \
             start_slot, end_slot, weeks) \
             VALUES ('{qid}', '{rid}', 'm.rivera', 'teacher', '2024-03-04', 1, 1, 2)"
        ))
        .await
        .unwrap();

    // Maintenance then takes period 1 on the second Monday, so the
    // approval's re-validation must fail.
    client
        .batch_execute(&format!(
            "INSERT INTO schedule (room_id, date, slot, status, course, booked_by) \
             VALUES ('{rid}', '2024-03-11', 1, 'maintenance', NULL, 'facilities')"
        ))
        .await
        .unwrap();

    let err = client
        .simple_query(&format!(
            "UPDATE requests SET status = 'approved', reviewed_by = 'principal.vega', \
             reviewer_role = 'admin' WHERE id = '{qid}'"
        ))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("conflict"), "got: {err}");

    // The failed approval changed nothing: request still pending, no cell
    // written, the maintenance row untouched.
    let req = select_rows(
        &client,
        &format!("SELECT * FROM requests WHERE id = '{qid}'"),
    )
    .await;
    assert_eq!(req[0].get("status"), Some("pending"));

    let rows = select_rows(
        &client,
        &format!("SELECT * FROM schedule WHERE room_id = '{rid}' AND date = '2024-03-04'"),
    )
    .await;
    assert!(rows.iter().all(|r| r.get("status") != Some("occupied")));

    let rows = select_rows(
        &client,
        &format!(
            "SELECT * FROM schedule WHERE room_id = '{rid}' AND date = '2024-03-11' AND slot = 1"
        ),
    )
    .await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("status"), Some("maintenance"));
}

#[tokio::test]
async fn competing_requests_first_approval_wins() {
    let (addr, _tm) = start_test_server().await;
    let (client, _rx) = connect(addr).await;

    let rid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO rooms (id, building, name) VALUES ('{rid}', 'Main Hall', '101')"
        ))
        .await
        .unwrap();

    // Two teachers ask for the same cells; both requests are accepted,
    // pending never blocks creation.
    let qa = Ulid::new();
    let qb = Ulid::new();
    for (qid, who) in [(qa, "m.rivera"), (qb, "j.okafor")] {
        client
            .batch_execute(&format!(
                "INSERT INTO requests (id, room_id, requested_by, requester_role, base_date, \
                 start_slot, end_slot, weeks) \
                 VALUES ('{qid}', '{rid}', '{who}', 'teacher', '2024-05-06', 3, 4, 1)"
            ))
            .await
            .unwrap();
    }

    client
        .batch_execute(&format!(
            "UPDATE requests SET status = 'approved', reviewed_by = 'principal.vega', \
             reviewer_role = 'admin' WHERE id = '{qa}'"
        ))
        .await
        .unwrap();

    let err = client
        .simple_query(&format!(
            "UPDATE requests SET status = 'approved', reviewed_by = 'principal.vega', \
             reviewer_role = 'admin' WHERE id = '{qb}'"
        ))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("conflict"), "got: {err}");

    // Loser stays pending; the cells belong to the winner.
    let req = select_rows(&client, &format!("SELECT * FROM requests WHERE id = '{qb}'")).await;
    assert_eq!(req[0].get("status"), Some("pending"));

    let rows = select_rows(
        &client,
        &format!("SELECT * FROM schedule WHERE room_id = '{rid}' AND date = '2024-05-06'"),
    )
    .await;
    let occupied: Vec<_> = rows
        .iter()
        .filter(|r| r.get("status") == Some("occupied"))
        .collect();
    assert_eq!(occupied.len(), 2);
    assert!(occupied.iter().all(|r| r.get("booked_by") == Some("m.rivera")));
}

#[tokio::test]
async fn reject_touches_no_schedule_entries() {
    let (addr, _tm) = start_test_server().await;
    let (client, _rx) = connect(addr).await;

    let rid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO rooms (id, building, name) VALUES ('{rid}', 'Annex', '12')"
        ))
        .await
        .unwrap();

    let qid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO requests (id, room_id, requested_by, requester_role, base_date, \
             start_slot, end_slot, weeks) \
             VALUES ('{qid}', '{rid}', 's.tanaka', 'student', '2024-04-01', 5, 6, 2)"
        ))
        .await
        .unwrap();

    client
        .batch_execute(&format!(
            "UPDATE requests SET status = 'rejected', reviewed_by = 'principal.vega', \
             reviewer_role = 'admin', note = 'space needed for exams' WHERE id = '{qid}'"
        ))
        .await
        .unwrap();

    let req = select_rows(&client, &format!("SELECT * FROM requests WHERE id = '{qid}'")).await;
    assert_eq!(req[0].get("status"), Some("rejected"));
    assert_eq!(req[0].get("review_note"), Some("space needed for exams"));

    let rows = select_rows(
        &client,
        &format!(
            "SELECT * FROM schedule WHERE room_id = '{rid}' \
             AND date >= '2024-04-01' AND date <= '2024-04-08'"
        ),
    )
    .await;
    assert!(rows.iter().all(|r| r.get("status") == Some("empty")));
}

#[tokio::test]
async fn revert_spares_cells_overwritten_since_approval() {
    let (addr, _tm) = start_test_server().await;
    let (client, _rx) = connect(addr).await;

    let rid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO rooms (id, building, name) VALUES ('{rid}', 'Science Wing', '204')"
        ))
        .await
        .unwrap();

    let qid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO requests (id, room_id, requested_by, requester_role, base_date, \
             start_slot, end_slot, weeks) \
             VALUES ('{qid}', '{rid}', 'm.rivera', 'teacher', '2024-09-02', 1, 2, 1)"
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "UPDATE requests SET status = 'approved', reviewed_by = 'principal.vega', \
             reviewer_role = 'admin' WHERE id = '{qid}'"
        ))
        .await
        .unwrap();

    // Office takes over period 2 directly; the override drops the back-ref.
    client
        .batch_execute(&format!(
            "INSERT INTO schedule (room_id, date, slot, status, course, booked_by) \
             VALUES ('{rid}', '2024-09-02', 2, 'occupied', 'Faculty meeting', 'office')"
        ))
        .await
        .unwrap();

    client
        .batch_execute(&format!(
            "UPDATE requests SET status = 'reverted', reviewed_by = 'principal.vega', \
             reviewer_role = 'admin' WHERE id = '{qid}'"
        ))
        .await
        .unwrap();

    // Period 1 came back empty; the override on period 2 survived.
    let rows = select_rows(
        &client,
        &format!("SELECT * FROM schedule WHERE room_id = '{rid}' AND date = '2024-09-02'"),
    )
    .await;
    let slot1 = rows.iter().find(|r| r.get("slot") == Some("1")).unwrap();
    assert_eq!(slot1.get("status"), Some("empty"));
    let slot2 = rows.iter().find(|r| r.get("slot") == Some("2")).unwrap();
    assert_eq!(slot2.get("status"), Some("occupied"));
    assert_eq!(slot2.get("booked_by"), Some("office"));

    let req = select_rows(&client, &format!("SELECT * FROM requests WHERE id = '{qid}'")).await;
    assert_eq!(req[0].get("status"), Some("reverted"));
}

#[tokio::test]
async fn pending_request_overlays_the_grid() {
    let (addr, _tm) = start_test_server().await;
    let (client, _rx) = connect(addr).await;

    let rid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO rooms (id, building, name) VALUES ('{rid}', 'Annex', '12')"
        ))
        .await
        .unwrap();

    let qid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO requests (id, room_id, requested_by, requester_role, base_date, \
             start_slot, end_slot, weeks) \
             VALUES ('{qid}', '{rid}', 'm.rivera', 'teacher', '2024-04-01', 1, 2, 1)"
        ))
        .await
        .unwrap();

    // Not approved: nothing stored, but the grid shows the claim.
    let rows = select_rows(
        &client,
        &format!("SELECT * FROM schedule WHERE room_id = '{rid}' AND date = '2024-04-01'"),
    )
    .await;
    let qid_str = qid.to_string();
    for slot in ["1", "2"] {
        let row = rows.iter().find(|r| r.get("slot") == Some(slot)).unwrap();
        assert_eq!(row.get("status"), Some("pending"));
        assert_eq!(row.get("request_id"), Some(qid_str.as_str()));
    }
    let row = rows.iter().find(|r| r.get("slot") == Some("3")).unwrap();
    assert_eq!(row.get("status"), Some("empty"));
}

#[tokio::test]
async fn clear_entry_is_idempotent() {
    let (addr, _tm) = start_test_server().await;
    let (client, _rx) = connect(addr).await;

    let rid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO rooms (id, building, name) VALUES ('{rid}', 'Annex', '12')"
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO schedule (room_id, date, slot, status) \
             VALUES ('{rid}', '2024-03-04', 5, 'occupied')"
        ))
        .await
        .unwrap();

    let clear = format!(
        "DELETE FROM schedule WHERE room_id = '{rid}' AND date = '2024-03-04' AND slot = 5"
    );
    client.batch_execute(&clear).await.unwrap();
    // Clearing an already-empty cell succeeds quietly.
    client.batch_execute(&clear).await.unwrap();

    let rows = select_rows(
        &client,
        &format!(
            "SELECT * FROM schedule WHERE room_id = '{rid}' AND date = '2024-03-04' AND slot = 5"
        ),
    )
    .await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("status"), Some("empty"));
}

// ── LISTEN / NOTIFY ──────────────────────────────────────────

#[tokio::test]
async fn listen_room_channel_delivers() {
    let (addr, _tm) = start_test_server().await;
    let (client1, mut rx1) = connect(addr).await;

    let rid = Ulid::new();
    client1
        .batch_execute(&format!(
            "INSERT INTO rooms (id, building, name) VALUES ('{rid}', 'Science Wing', '204')"
        ))
        .await
        .unwrap();
    client1
        .batch_execute(&format!("LISTEN room_{rid}"))
        .await
        .unwrap();

    let (client2, _rx2) = connect(addr).await;
    client2
        .batch_execute(&format!(
            "INSERT INTO schedule (room_id, date, slot, status) \
             VALUES ('{rid}', '2024-03-04', 5, 'occupied')"
        ))
        .await
        .unwrap();

    poll_notifications(&client1).await;

    let notif = recv_notification(&mut rx1, Duration::from_secs(5)).await;
    assert!(notif.is_some(), "expected notification");
    let notif = notif.unwrap();
    assert_eq!(notif.channel(), &format!("room_{rid}"));

    let parsed: serde_json::Value = serde_json::from_str(notif.payload())
        .expect("notification payload should be valid JSON");
    assert!(parsed.is_object());
}

#[tokio::test]
async fn requests_channel_sees_lifecycle() {
    let (addr, _tm) = start_test_server().await;
    let (client1, mut rx1) = connect(addr).await;
    client1.batch_execute("LISTEN requests").await.unwrap();

    let (client2, _rx2) = connect(addr).await;
    let rid = Ulid::new();
    client2
        .batch_execute(&format!(
            "INSERT INTO rooms (id, building, name) VALUES ('{rid}', 'Science Wing', '204')"
        ))
        .await
        .unwrap();
    let qid = Ulid::new();
    client2
        .batch_execute(&format!(
            "INSERT INTO requests (id, room_id, requested_by, requester_role, base_date, \
             start_slot, end_slot, weeks) \
             VALUES ('{qid}', '{rid}', 'm.rivera', 'teacher', '2024-03-04', 1, 1, 1)"
        ))
        .await
        .unwrap();
    client2
        .batch_execute(&format!(
            "UPDATE requests SET status = 'approved', reviewed_by = 'principal.vega', \
             reviewer_role = 'admin' WHERE id = '{qid}'"
        ))
        .await
        .unwrap();

    poll_notifications(&client1).await;

    // Creation and approval, in order; the room insert stays off this channel.
    let first = recv_notification(&mut rx1, Duration::from_secs(5)).await;
    assert!(first.is_some(), "expected request-created notification");
    assert_eq!(first.unwrap().channel(), "requests");

    let second = recv_notification(&mut rx1, Duration::from_secs(5)).await;
    assert!(second.is_some(), "expected request-approved notification");
    let second = second.unwrap();
    assert_eq!(second.channel(), "requests");
    let parsed: serde_json::Value = serde_json::from_str(second.payload()).unwrap();
    assert!(parsed.is_object());

    let third = recv_notification(&mut rx1, Duration::from_millis(500)).await;
    assert!(third.is_none(), "only lifecycle events belong here");
}

#[tokio::test]
async fn notification_only_for_subscribed_room() {
    let (addr, _tm) = start_test_server().await;
    let (client1, mut rx1) = connect(addr).await;

    let rid_a = Ulid::new();
    let rid_b = Ulid::new();
    for (rid, name) in [(rid_a, "204"), (rid_b, "205")] {
        client1
            .batch_execute(&format!(
                "INSERT INTO rooms (id, building, name) VALUES ('{rid}', 'Science Wing', '{name}')"
            ))
            .await
            .unwrap();
    }
    client1
        .batch_execute(&format!("LISTEN room_{rid_a}"))
        .await
        .unwrap();

    let (client2, _rx2) = connect(addr).await;
    client2
        .batch_execute(&format!(
            "INSERT INTO schedule (room_id, date, slot, status) \
             VALUES ('{rid_b}', '2024-03-04', 1, 'occupied')"
        ))
        .await
        .unwrap();

    poll_notifications(&client1).await;
    let notif = recv_notification(&mut rx1, Duration::from_millis(500)).await;
    assert!(notif.is_none(), "unsubscribed room must not notify");

    client2
        .batch_execute(&format!(
            "INSERT INTO schedule (room_id, date, slot, status) \
             VALUES ('{rid_a}', '2024-03-04', 1, 'occupied')"
        ))
        .await
        .unwrap();

    poll_notifications(&client1).await;
    let notif = recv_notification(&mut rx1, Duration::from_secs(5)).await;
    assert!(notif.is_some(), "subscribed room should notify");
    assert_eq!(notif.unwrap().channel(), &format!("room_{rid_a}"));
}

#[tokio::test]
async fn listen_duplicate_is_idempotent() {
    let (addr, _tm) = start_test_server().await;
    let (client1, mut rx1) = connect(addr).await;

    let rid = Ulid::new();
    client1
        .batch_execute(&format!(
            "INSERT INTO rooms (id, building, name) VALUES ('{rid}', 'Annex', '12')"
        ))
        .await
        .unwrap();
    client1
        .batch_execute(&format!("LISTEN room_{rid}"))
        .await
        .unwrap();
    client1
        .batch_execute(&format!("LISTEN room_{rid}"))
        .await
        .unwrap();

    let (client2, _rx2) = connect(addr).await;
    client2
        .batch_execute(&format!(
            "INSERT INTO schedule (room_id, date, slot, status) \
             VALUES ('{rid}', '2024-03-04', 1, 'occupied')"
        ))
        .await
        .unwrap();

    poll_notifications(&client1).await;

    let notif1 = recv_notification(&mut rx1, Duration::from_secs(5)).await;
    assert!(notif1.is_some(), "should receive one notification");
    let notif2 = recv_notification(&mut rx1, Duration::from_millis(500)).await;
    assert!(notif2.is_none(), "should not receive duplicate notification");
}

#[tokio::test]
async fn unlisten_stops_notifications() {
    let (addr, _tm) = start_test_server().await;
    let (client1, mut rx1) = connect(addr).await;

    let rid = Ulid::new();
    client1
        .batch_execute(&format!(
            "INSERT INTO rooms (id, building, name) VALUES ('{rid}', 'Annex', '12')"
        ))
        .await
        .unwrap();
    client1
        .batch_execute(&format!("LISTEN room_{rid}"))
        .await
        .unwrap();
    client1
        .batch_execute(&format!("UNLISTEN room_{rid}"))
        .await
        .unwrap();

    let (client2, _rx2) = connect(addr).await;
    client2
        .batch_execute(&format!(
            "INSERT INTO schedule (room_id, date, slot, status) \
             VALUES ('{rid}', '2024-03-04', 1, 'occupied')"
        ))
        .await
        .unwrap();

    poll_notifications(&client1).await;
    let notif = recv_notification(&mut rx1, Duration::from_millis(500)).await;
    assert!(notif.is_none(), "should not receive notification after UNLISTEN");
}

#[tokio::test]
async fn unlisten_all_stops_everything() {
    let (addr, _tm) = start_test_server().await;
    let (client1, mut rx1) = connect(addr).await;

    let rid = Ulid::new();
    client1
        .batch_execute(&format!(
            "INSERT INTO rooms (id, building, name) VALUES ('{rid}', 'Annex', '12')"
        ))
        .await
        .unwrap();
    client1
        .batch_execute(&format!("LISTEN room_{rid}"))
        .await
        .unwrap();
    client1.batch_execute("LISTEN requests").await.unwrap();
    client1.batch_execute("UNLISTEN *").await.unwrap();

    let (client2, _rx2) = connect(addr).await;
    client2
        .batch_execute(&format!(
            "INSERT INTO schedule (room_id, date, slot, status) \
             VALUES ('{rid}', '2024-03-04', 1, 'occupied')"
        ))
        .await
        .unwrap();
    let qid = Ulid::new();
    client2
        .batch_execute(&format!(
            "INSERT INTO requests (id, room_id, requested_by, requester_role, base_date, \
             start_slot, end_slot, weeks) \
             VALUES ('{qid}', '{rid}', 'm.rivera', 'teacher', '2024-03-04', 2, 2, 1)"
        ))
        .await
        .unwrap();

    poll_notifications(&client1).await;
    let notif = recv_notification(&mut rx1, Duration::from_millis(500)).await;
    assert!(notif.is_none(), "should not receive notifications after UNLISTEN *");
}

#[tokio::test]
async fn multiple_events_flush_together() {
    let (addr, _tm) = start_test_server().await;
    let (client1, mut rx1) = connect(addr).await;

    let rid = Ulid::new();
    client1
        .batch_execute(&format!(
            "INSERT INTO rooms (id, building, name) VALUES ('{rid}', 'Annex', '12')"
        ))
        .await
        .unwrap();
    client1
        .batch_execute(&format!("LISTEN room_{rid}"))
        .await
        .unwrap();

    let (client2, _rx2) = connect(addr).await;
    for slot in 1..=3 {
        client2
            .batch_execute(&format!(
                "INSERT INTO schedule (room_id, date, slot, status) \
                 VALUES ('{rid}', '2024-03-04', {slot}, 'occupied')"
            ))
            .await
            .unwrap();
    }

    // One poll drains the whole backlog.
    poll_notifications(&client1).await;
    let mut count = 0;
    for _ in 0..3 {
        if recv_notification(&mut rx1, Duration::from_secs(5))
            .await
            .is_some()
        {
            count += 1;
        }
    }
    assert_eq!(count, 3, "should receive all 3 notifications");
}

#[tokio::test]
async fn disconnect_cleans_up() {
    let (addr, _tm) = start_test_server().await;
    let (client1, _rx1) = connect(addr).await;

    let rid = Ulid::new();
    client1
        .batch_execute(&format!(
            "INSERT INTO rooms (id, building, name) VALUES ('{rid}', 'Annex', '12')"
        ))
        .await
        .unwrap();
    client1
        .batch_execute(&format!("LISTEN room_{rid}"))
        .await
        .unwrap();

    // Drop client — should not panic or leak
    drop(client1);
    drop(_rx1);

    // Wait a bit for the server to clean up
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Another connection should still work fine
    let (client2, _rx2) = connect(addr).await;
    client2
        .batch_execute(&format!(
            "INSERT INTO schedule (room_id, date, slot, status) \
             VALUES ('{rid}', '2024-03-04', 1, 'occupied')"
        ))
        .await
        .unwrap();
}

// ── Errors and isolation ─────────────────────────────────────

#[tokio::test]
async fn bad_sql_is_rejected() {
    let (addr, _tm) = start_test_server().await;
    let (client, _rx) = connect(addr).await;

    // The catalog is read-only and the request log is append-only.
    assert!(client.simple_query("DELETE FROM slots").await.is_err());
    assert!(client.simple_query("DELETE FROM requests").await.is_err());
    assert!(
        client
            .simple_query("INSERT INTO blackboards (id) VALUES ('x')")
            .await
            .is_err()
    );
    // A review without a reviewer is refused.
    assert!(
        client
            .simple_query(
                "UPDATE requests SET status = 'approved' \
                 WHERE id = '01ARZ3NDEKTSV4RRFFQ69G5FAV'"
            )
            .await
            .is_err()
    );
}

#[tokio::test]
async fn invalid_channel_rejected() {
    let (addr, _tm) = start_test_server().await;
    let (client, _rx) = connect(addr).await;

    assert!(client.simple_query("LISTEN classroom_updates").await.is_err());
    assert!(client.simple_query("LISTEN room_not_a_ulid").await.is_err());
}

#[tokio::test]
async fn tenants_are_isolated() {
    let (addr, _tm) = start_test_server().await;
    let (client_a, _rxa) = connect_db(addr, "school_a").await;
    let (client_b, _rxb) = connect_db(addr, "school_b").await;

    let rid = Ulid::new();
    client_a
        .batch_execute(&format!(
            "INSERT INTO rooms (id, building, name) VALUES ('{rid}', 'Science Wing', '204')"
        ))
        .await
        .unwrap();

    let rows = select_rows(&client_a, "SELECT * FROM rooms").await;
    assert_eq!(rows.len(), 1);
    let rows = select_rows(&client_b, "SELECT * FROM rooms").await;
    assert!(rows.is_empty(), "tenants must not see each other's rooms");
}
