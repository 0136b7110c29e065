//! pgwire front end: SQL in, rows and tags out.
//!
//! LISTEN spawns a forwarder task per channel that copies broadcast events
//! into a per-connection outbox. The client socket is only writable while a
//! statement is being handled, so queued notifications are flushed right
//! before each statement's results. Clients that want prompt delivery poll
//! with any cheap statement, e.g. `SELECT * FROM slots`.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream;
use futures::{Sink, SinkExt};
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::response::NotificationResponse;
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use ulid::Ulid;

use crate::auth::AulaAuthSource;
use crate::engine::Engine;
use crate::model::*;
use crate::notify::{self, REQUESTS_CHANNEL};
use crate::observability;
use crate::sql::{self, Command};
use crate::tenant::TenantManager;

/// A notification waiting for the next chance to write to the client socket.
struct QueuedNotification {
    channel: String,
    payload: String,
}

pub struct AulaHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<AulaQueryParser>,
    /// Channel name → forwarder task feeding the outbox.
    subscriptions: DashMap<String, JoinHandle<()>>,
    outbox_tx: mpsc::UnboundedSender<QueuedNotification>,
    outbox_rx: Mutex<mpsc::UnboundedReceiver<QueuedNotification>>,
}

impl AulaHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        Self {
            tenant_manager,
            query_parser: Arc::new(AulaQueryParser),
            subscriptions: DashMap::new(),
            outbox_tx,
            outbox_rx: Mutex::new(outbox_rx),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    /// Parse and execute one statement, recording query metrics.
    async fn run_statement(&self, engine: &Engine, sql_text: &str) -> PgWireResult<Vec<Response>> {
        let cmd = match sql::parse_sql(sql_text) {
            Ok(cmd) => cmd,
            Err(e) => {
                metrics::counter!(
                    observability::QUERIES_TOTAL,
                    "command" => "invalid",
                    "status" => "error"
                )
                .increment(1);
                return Err(sql_err(e));
            }
        };
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(engine, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(
            observability::QUERIES_TOTAL,
            "command" => label,
            "status" => status
        )
        .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(
        &self,
        engine: &Engine,
        cmd: Command,
    ) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::InsertRoom { id, building, name } => {
                engine
                    .create_room(id, building, name)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateRoom { id, building, name } => {
                engine
                    .update_room(id, building, name)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteRoom { id } => {
                engine.delete_room(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SetEntry {
                room_id,
                date,
                slot,
                status,
                course,
                booked_by,
            } => {
                engine
                    .set_entry(room_id, date, slot, status, course, booked_by)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::ClearEntry {
                room_id,
                date,
                slot,
            } => {
                engine
                    .clear_entry(room_id, date, slot)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertRequest {
                id,
                room_id,
                requested_by,
                requester_role,
                base_date,
                start_slot,
                end_slot,
                weeks,
                course,
                note,
            } => {
                engine
                    .create_request(NewRequest {
                        id,
                        room_id,
                        requested_by,
                        requester_role,
                        base_date,
                        start_slot,
                        end_slot,
                        weeks,
                        course,
                        note,
                    })
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::ApproveRequest {
                id,
                reviewed_by,
                reviewer_role,
            } => {
                engine
                    .approve_request(id, reviewed_by, reviewer_role)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::RejectRequest {
                id,
                reviewed_by,
                reviewer_role,
                note,
            } => {
                engine
                    .reject_request(id, reviewed_by, reviewer_role, note)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::RevertRequest {
                id,
                reviewed_by,
                reviewer_role,
                note,
            } => {
                engine
                    .revert_request(id, reviewed_by, reviewer_role, note)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::SelectSlots { category } => {
                let slots = engine.catalog.list(category);
                let schema = Arc::new(slots_schema());
                let rows: Vec<PgWireResult<_>> = slots
                    .into_iter()
                    .map(|slot| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&(slot.id as i32))?;
                        encoder.encode_field(&slot.label)?;
                        encoder.encode_field(&slot.category.as_str())?;
                        encoder.encode_field(&(slot.sort_order as i32))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectRooms { building } => {
                let rooms = engine.list_rooms(building.as_deref()).await;
                let schema = Arc::new(rooms_schema());
                let rows: Vec<PgWireResult<_>> = rooms
                    .into_iter()
                    .map(|room| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&room.id.to_string())?;
                        encoder.encode_field(&room.building)?;
                        encoder.encode_field(&room.name)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectSchedule {
                room_id,
                from,
                to,
                slot,
            } => {
                let grid = engine
                    .room_schedule(room_id, from, to, slot)
                    .await
                    .map_err(engine_err)?;

                let schema = Arc::new(schedule_schema());
                let rid_str = room_id.to_string();
                let rows: Vec<PgWireResult<_>> = grid
                    .into_iter()
                    .map(|row| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&rid_str)?;
                        encoder.encode_field(&row.date.to_string())?;
                        encoder.encode_field(&(row.slot as i32))?;
                        encoder.encode_field(&row.status.as_str())?;
                        encoder.encode_field(&row.course)?;
                        encoder.encode_field(&row.booked_by)?;
                        encoder.encode_field(&row.request_id.map(|id| id.to_string()))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectRequests { id, filter } => {
                let requests = match id {
                    Some(id) => vec![engine.get_request(id).await.map_err(engine_err)?],
                    None => engine.list_requests(&filter).await,
                };
                let schema = Arc::new(requests_schema());
                let rows: Vec<PgWireResult<_>> = requests
                    .into_iter()
                    .map(|req| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&req.id.to_string())?;
                        encoder.encode_field(&req.room_id.to_string())?;
                        encoder.encode_field(&req.building)?;
                        encoder.encode_field(&req.requested_by)?;
                        encoder.encode_field(&req.requester_role.as_str())?;
                        encoder.encode_field(&req.base_date.to_string())?;
                        encoder.encode_field(&(req.start_slot as i32))?;
                        encoder.encode_field(&(req.end_slot as i32))?;
                        encoder.encode_field(&(req.weeks as i32))?;
                        encoder.encode_field(&req.status.as_str())?;
                        encoder.encode_field(&req.course)?;
                        encoder.encode_field(&req.note)?;
                        encoder.encode_field(&req.created_at)?;
                        encoder.encode_field(&req.reviewed_by)?;
                        encoder.encode_field(&req.reviewed_at)?;
                        encoder.encode_field(&req.review_note)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::Listen { channel } => {
                let canonical = canonical_channel(&channel)?;
                // LISTEN on an already-subscribed channel is a no-op.
                if !self.subscriptions.contains_key(&canonical) {
                    let rx = engine.notify.subscribe(&canonical);
                    let handle = spawn_forwarder(canonical.clone(), rx, self.outbox_tx.clone());
                    self.subscriptions.insert(canonical, handle);
                }
                Ok(vec![Response::Execution(Tag::new("LISTEN"))])
            }
            Command::Unlisten { channel } => {
                // UNLISTEN on a channel that was never subscribed is a no-op,
                // so malformed names pass through unvalidated.
                let key = canonical_channel(&channel).unwrap_or(channel);
                if let Some((_, handle)) = self.subscriptions.remove(&key) {
                    handle.abort();
                }
                Ok(vec![Response::Execution(Tag::new("UNLISTEN"))])
            }
            Command::UnlistenAll => {
                self.subscriptions.retain(|_, handle| {
                    handle.abort();
                    false
                });
                Ok(vec![Response::Execution(Tag::new("UNLISTEN"))])
            }
        }
    }
}

impl Drop for AulaHandler {
    fn drop(&mut self) {
        for entry in self.subscriptions.iter() {
            entry.value().abort();
        }
    }
}

// ── Notifications ────────────────────────────────────────────────

/// Validate a channel name and normalize it to the form the hub publishes
/// on: `requests`, or `room_<ULID>` with the ULID in canonical casing.
fn canonical_channel(channel: &str) -> PgWireResult<String> {
    if channel == REQUESTS_CHANNEL {
        return Ok(channel.to_string());
    }
    if let Some(id_str) = channel.strip_prefix("room_") {
        let room_id = Ulid::from_string(id_str).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "42000".into(),
                format!("bad ULID in channel: {e}"),
            )))
        })?;
        return Ok(notify::room_channel(room_id));
    }
    Err(PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42000".into(),
        format!("invalid channel: {channel} (expected room_{{id}} or requests)"),
    ))))
}

/// Copy events from a broadcast channel into the connection's outbox until
/// the subscription is dropped or the connection goes away.
fn spawn_forwarder(
    channel: String,
    mut rx: broadcast::Receiver<Event>,
    outbox: mpsc::UnboundedSender<QueuedNotification>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let payload = match serde_json::to_string(&event) {
                        Ok(payload) => payload,
                        Err(e) => {
                            tracing::warn!("dropping unencodable notification: {e}");
                            continue;
                        }
                    };
                    let queued = QueuedNotification {
                        channel: channel.clone(),
                        payload,
                    };
                    if outbox.send(queued).is_err() {
                        break;
                    }
                }
                // A slow consumer missed events; skip ahead rather than die.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

impl AulaHandler {
    /// Drain the outbox and write each entry as a NotificationResponse frame.
    async fn flush_notifications<C>(&self, client: &mut C) -> PgWireResult<()>
    where
        C: Sink<PgWireBackendMessage> + Unpin + Send,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let mut pending = Vec::new();
        {
            let mut outbox = self.outbox_rx.lock().await;
            while let Ok(queued) = outbox.try_recv() {
                pending.push(queued);
            }
        }
        for queued in pending {
            let kind = if queued.channel == REQUESTS_CHANNEL {
                "requests"
            } else {
                "room"
            };
            // No backend pid to report; clients key on channel and payload.
            client
                .send(PgWireBackendMessage::NotificationResponse(
                    NotificationResponse::new(0, queued.channel, queued.payload),
                ))
                .await?;
            metrics::counter!(observability::NOTIFICATIONS_SENT_TOTAL, "channel" => kind)
                .increment(1);
        }
        Ok(())
    }
}

#[async_trait]
impl SimpleQueryHandler for AulaHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        self.flush_notifications(client).await?;
        self.run_statement(&engine, query).await
    }
}

// ── Row schemas ──────────────────────────────────────────────────

fn slots_schema() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new("id".into(), None, None, Type::INT4, FieldFormat::Text),
        FieldInfo::new("label".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new(
            "category".into(),
            None,
            None,
            Type::VARCHAR,
            FieldFormat::Text,
        ),
        FieldInfo::new(
            "sort_order".into(),
            None,
            None,
            Type::INT4,
            FieldFormat::Text,
        ),
    ]
}

fn rooms_schema() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new("id".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new(
            "building".into(),
            None,
            None,
            Type::VARCHAR,
            FieldFormat::Text,
        ),
        FieldInfo::new("name".into(), None, None, Type::VARCHAR, FieldFormat::Text),
    ]
}

fn schedule_schema() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new(
            "room_id".into(),
            None,
            None,
            Type::VARCHAR,
            FieldFormat::Text,
        ),
        FieldInfo::new("date".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new("slot".into(), None, None, Type::INT4, FieldFormat::Text),
        FieldInfo::new(
            "status".into(),
            None,
            None,
            Type::VARCHAR,
            FieldFormat::Text,
        ),
        FieldInfo::new(
            "course".into(),
            None,
            None,
            Type::VARCHAR,
            FieldFormat::Text,
        ),
        FieldInfo::new(
            "booked_by".into(),
            None,
            None,
            Type::VARCHAR,
            FieldFormat::Text,
        ),
        FieldInfo::new(
            "request_id".into(),
            None,
            None,
            Type::VARCHAR,
            FieldFormat::Text,
        ),
    ]
}

fn requests_schema() -> Vec<FieldInfo> {
    let varchar = |name: &str| {
        FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
    };
    let int4 = |name: &str| FieldInfo::new(name.into(), None, None, Type::INT4, FieldFormat::Text);
    let int8 = |name: &str| FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text);
    vec![
        varchar("id"),
        varchar("room_id"),
        varchar("building"),
        varchar("requested_by"),
        varchar("requester_role"),
        varchar("base_date"),
        int4("start_slot"),
        int4("end_slot"),
        int4("weeks"),
        varchar("status"),
        varchar("course"),
        varchar("note"),
        int8("created_at"),
        varchar("reviewed_by"),
        int8("reviewed_at"),
        varchar("review_note"),
    ]
}

/// Best-effort schema for Describe, before parameters are bound. The table
/// named in the statement decides the row shape.
fn result_schema_for(sql_text: &str) -> Vec<FieldInfo> {
    let upper = sql_text.to_uppercase();
    if !upper.contains("SELECT") {
        return vec![];
    }
    if upper.contains("SLOTS") {
        slots_schema()
    } else if upper.contains("SCHEDULE") {
        schedule_schema()
    } else if upper.contains("REQUESTS") {
        requests_schema()
    } else if upper.contains("ROOMS") {
        rooms_schema()
    } else {
        vec![]
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct AulaQueryParser;

#[async_trait]
impl QueryParser for AulaQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema_for(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for AulaHandler {
    type Statement = String;
    type QueryParser = AulaQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        self.flush_notifications(client).await?;
        let sql_text = substitute_params(portal);
        let mut responses = self.run_statement(&engine, &sql_text).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema_for(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema_for(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start {
                if let Ok(n) = sql[start..i].parse::<usize>() {
                    if n > max {
                        max = n;
                    }
                }
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let sql = portal.statement.statement.to_string();
    let params = &portal.parameters;
    let mut result = sql;

    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }

    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct AulaFactory {
    handler: Arc<AulaHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<AulaAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl AulaFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = AulaAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(AulaHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for AulaFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection. The factory, and with it the handler's
/// subscriptions and outbox, lives exactly as long as the connection.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = AulaFactory::new(tenant_manager, password);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: crate::engine::EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "P0001".into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
