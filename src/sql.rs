use chrono::NaiveDate;
use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertRoom {
        id: Ulid,
        building: String,
        name: String,
    },
    UpdateRoom {
        id: Ulid,
        building: Option<String>,
        name: Option<String>,
    },
    DeleteRoom {
        id: Ulid,
    },
    SetEntry {
        room_id: Ulid,
        date: NaiveDate,
        slot: SlotId,
        status: EntryStatus,
        course: Option<String>,
        booked_by: Option<String>,
    },
    ClearEntry {
        room_id: Ulid,
        date: NaiveDate,
        slot: SlotId,
    },
    InsertRequest {
        id: Ulid,
        room_id: Ulid,
        requested_by: String,
        requester_role: Role,
        base_date: NaiveDate,
        start_slot: SlotId,
        end_slot: SlotId,
        weeks: u32,
        course: Option<String>,
        note: Option<String>,
    },
    ApproveRequest {
        id: Ulid,
        reviewed_by: String,
        reviewer_role: Role,
    },
    RejectRequest {
        id: Ulid,
        reviewed_by: String,
        reviewer_role: Role,
        note: Option<String>,
    },
    RevertRequest {
        id: Ulid,
        reviewed_by: String,
        reviewer_role: Role,
        note: Option<String>,
    },
    SelectSlots {
        category: Option<SlotCategory>,
    },
    SelectRooms {
        building: Option<String>,
    },
    SelectSchedule {
        room_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
        slot: Option<SlotId>,
    },
    SelectRequests {
        /// Point lookup; when set the filter is ignored.
        id: Option<Ulid>,
        filter: RequestFilter,
    },
    Listen {
        channel: String,
    },
    Unlisten {
        channel: String,
    },
    UnlistenAll,
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim();
    let upper = trimmed.to_uppercase();
    if upper.starts_with("LISTEN ") {
        let channel = trimmed[7..].trim().trim_matches(';').to_string();
        return Ok(Command::Listen { channel });
    }
    if upper.starts_with("UNLISTEN ") {
        let target = trimmed[9..].trim().trim_matches(';').trim();
        if target == "*" {
            return Ok(Command::UnlistenAll);
        }
        if target.is_empty() {
            return Err(SqlError::Parse("UNLISTEN needs a channel or *".into()));
        }
        return Ok(Command::Unlisten { channel: target.to_string() });
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update { table, assignments, selection, .. } => {
            parse_update(table, assignments, selection)
        }
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "rooms" => {
            if values.len() < 3 {
                return Err(SqlError::WrongArity("rooms", 3, values.len()));
            }
            Ok(Command::InsertRoom {
                id: parse_ulid(&values[0])?,
                building: parse_string(&values[1])?,
                name: parse_string(&values[2])?,
            })
        }
        "schedule" => {
            if values.len() < 4 {
                return Err(SqlError::WrongArity("schedule", 4, values.len()));
            }
            let course = if values.len() >= 5 {
                parse_opt_string(&values[4])?
            } else {
                None
            };
            let booked_by = if values.len() >= 6 {
                parse_opt_string(&values[5])?
            } else {
                None
            };
            Ok(Command::SetEntry {
                room_id: parse_ulid(&values[0])?,
                date: parse_date(&values[1])?,
                slot: parse_slot(&values[2])?,
                status: parse_entry_status(&values[3])?,
                course,
                booked_by,
            })
        }
        "requests" => {
            if values.len() < 8 {
                return Err(SqlError::WrongArity("requests", 8, values.len()));
            }
            let course = if values.len() >= 9 {
                parse_opt_string(&values[8])?
            } else {
                None
            };
            let note = if values.len() >= 10 {
                parse_opt_string(&values[9])?
            } else {
                None
            };
            Ok(Command::InsertRequest {
                id: parse_ulid(&values[0])?,
                room_id: parse_ulid(&values[1])?,
                requested_by: parse_string(&values[2])?,
                requester_role: parse_role(&values[3])?,
                base_date: parse_date(&values[4])?,
                start_slot: parse_slot(&values[5])?,
                end_slot: parse_slot(&values[6])?,
                weeks: parse_u32(&values[7])?,
                course,
                note,
            })
        }
        // The slot catalog is fixed reference data.
        "slots" => Err(SqlError::Unsupported("INSERT INTO slots".into())),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    match table.as_str() {
        "rooms" => {
            let id = extract_where_id(selection)?;
            let (mut building, mut name) = (None, None);
            for a in assignments {
                match assignment_column(&a.target)?.as_str() {
                    "building" => building = Some(parse_string(&a.value)?),
                    "name" => name = Some(parse_string(&a.value)?),
                    col => return Err(SqlError::Parse(format!("cannot update rooms.{col}"))),
                }
            }
            Ok(Command::UpdateRoom { id, building, name })
        }
        "requests" => parse_review(assignments, selection),
        "slots" | "schedule" => Err(SqlError::Unsupported(format!("UPDATE {table}"))),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Reviews arrive as `UPDATE requests SET status = ..., reviewed_by = ...,
/// reviewer_role = ... WHERE id = ...`; the target status picks the command.
fn parse_review(
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let id = extract_where_id(selection)?;
    let (mut status, mut reviewed_by, mut reviewer_role, mut note) = (None, None, None, None);
    for a in assignments {
        match assignment_column(&a.target)?.as_str() {
            "status" => status = Some(parse_request_status(&a.value)?),
            "reviewed_by" => reviewed_by = Some(parse_string(&a.value)?),
            "reviewer_role" => reviewer_role = Some(parse_role(&a.value)?),
            "note" => note = parse_opt_string(&a.value)?,
            col => return Err(SqlError::Parse(format!("cannot update requests.{col}"))),
        }
    }
    let status = status.ok_or_else(|| SqlError::Parse("review must set status".into()))?;
    let reviewed_by =
        reviewed_by.ok_or_else(|| SqlError::Parse("review must set reviewed_by".into()))?;
    let reviewer_role =
        reviewer_role.ok_or_else(|| SqlError::Parse("review must set reviewer_role".into()))?;

    match status {
        RequestStatus::Approved => {
            if note.is_some() {
                return Err(SqlError::Unsupported("note on approval".into()));
            }
            Ok(Command::ApproveRequest { id, reviewed_by, reviewer_role })
        }
        RequestStatus::Rejected => Ok(Command::RejectRequest { id, reviewed_by, reviewer_role, note }),
        RequestStatus::Reverted => Ok(Command::RevertRequest { id, reviewed_by, reviewer_role, note }),
        RequestStatus::Pending => {
            Err(SqlError::Unsupported("setting a request back to pending".into()))
        }
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;

    match table.as_str() {
        "rooms" => Ok(Command::DeleteRoom { id: extract_where_id(&delete.selection)? }),
        "schedule" => {
            let (room_id, date, slot) = extract_entry_key(&delete.selection)?;
            Ok(Command::ClearEntry { room_id, date, slot })
        }
        // The request log is append-only; reviews go through UPDATE.
        "slots" | "requests" => Err(SqlError::Unsupported(format!("DELETE FROM {table}"))),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    match table.as_str() {
        "slots" => {
            let mut category = None;
            if let Some(selection) = &select.selection {
                collect_slot_filters(selection, &mut category)?;
            }
            Ok(Command::SelectSlots { category })
        }
        "rooms" => {
            let mut building = None;
            if let Some(selection) = &select.selection {
                collect_room_filters(selection, &mut building)?;
            }
            Ok(Command::SelectRooms { building })
        }
        "schedule" => {
            let (mut room_id, mut from, mut to, mut slot) = (None, None, None, None);
            if let Some(selection) = &select.selection {
                collect_schedule_filters(selection, &mut room_id, &mut from, &mut to, &mut slot)?;
            }
            Ok(Command::SelectSchedule {
                room_id: room_id.ok_or(SqlError::MissingFilter("room_id"))?,
                from: from.ok_or(SqlError::MissingFilter("date"))?,
                to: to.ok_or(SqlError::MissingFilter("date"))?,
                slot,
            })
        }
        "requests" => {
            let mut id = None;
            let mut filter = RequestFilter::default();
            if let Some(selection) = &select.selection {
                collect_request_filters(selection, &mut id, &mut filter)?;
            }
            Ok(Command::SelectRequests { id, filter })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn collect_slot_filters(expr: &Expr, category: &mut Option<SlotCategory>) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_slot_filters(left, category)?;
                collect_slot_filters(right, category)?;
            }
            ast::BinaryOperator::Eq => {
                if expr_column_name(left).as_deref() == Some("category") {
                    *category = Some(parse_slot_category(right)?);
                }
            }
            _ => {}
        },
        _ => {}
    }
    Ok(())
}

fn collect_room_filters(expr: &Expr, building: &mut Option<String>) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_room_filters(left, building)?;
                collect_room_filters(right, building)?;
            }
            ast::BinaryOperator::Eq => {
                if expr_column_name(left).as_deref() == Some("building") {
                    *building = Some(parse_string(right)?);
                }
            }
            _ => {}
        },
        _ => {}
    }
    Ok(())
}

fn collect_schedule_filters(
    expr: &Expr,
    room_id: &mut Option<Ulid>,
    from: &mut Option<NaiveDate>,
    to: &mut Option<NaiveDate>,
    slot: &mut Option<SlotId>,
) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_schedule_filters(left, room_id, from, to, slot)?;
                collect_schedule_filters(right, room_id, from, to, slot)?;
            }
            ast::BinaryOperator::Eq => match expr_column_name(left).as_deref() {
                Some("room_id") => *room_id = Some(parse_ulid(right)?),
                Some("date") => {
                    // Exact date: a one-day window.
                    let d = parse_date(right)?;
                    *from = Some(d);
                    *to = Some(d);
                }
                Some("slot") => *slot = Some(parse_slot(right)?),
                _ => {}
            },
            ast::BinaryOperator::GtEq => {
                if expr_column_name(left).as_deref() == Some("date") {
                    *from = Some(parse_date(right)?);
                }
            }
            ast::BinaryOperator::LtEq => {
                if expr_column_name(left).as_deref() == Some("date") {
                    *to = Some(parse_date(right)?);
                }
            }
            _ => {}
        },
        _ => {}
    }
    Ok(())
}

fn collect_request_filters(
    expr: &Expr,
    id: &mut Option<Ulid>,
    filter: &mut RequestFilter,
) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_request_filters(left, id, filter)?;
                collect_request_filters(right, id, filter)?;
            }
            ast::BinaryOperator::Eq => match expr_column_name(left).as_deref() {
                Some("id") => *id = Some(parse_ulid(right)?),
                Some("status") => {
                    filter.status = Some(StatusFilter::Is(parse_request_status(right)?));
                }
                Some("building") => filter.building = Some(parse_string(right)?),
                Some("requester_role") => filter.requester_role = Some(parse_role(right)?),
                Some("requested_by") => filter.requested_by = Some(parse_string(right)?),
                Some("base_date") => {
                    let d = parse_date(right)?;
                    filter.from = Some(d);
                    filter.to = Some(d);
                }
                _ => {}
            },
            ast::BinaryOperator::NotEq => {
                if expr_column_name(left).as_deref() == Some("status") {
                    filter.status = Some(StatusFilter::Not(parse_request_status(right)?));
                }
            }
            ast::BinaryOperator::GtEq => {
                if expr_column_name(left).as_deref() == Some("base_date") {
                    filter.from = Some(parse_date(right)?);
                }
            }
            ast::BinaryOperator::LtEq => {
                if expr_column_name(left).as_deref() == Some("base_date") {
                    filter.to = Some(parse_date(right)?);
                }
            }
            _ => {}
        },
        _ => {}
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn assignment_column(target: &ast::AssignmentTarget) -> Result<String, SqlError> {
    match target {
        ast::AssignmentTarget::ColumnName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty column name".into()))
        }
        _ => Err(SqlError::Parse("unsupported assignment target".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            if values.rows.len() > 1 {
                return Err(SqlError::Unsupported("multi-row INSERT".into()));
            }
            Ok(values.rows[0].clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn extract_entry_key(selection: &Option<Expr>) -> Result<(Ulid, NaiveDate, SlotId), SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("room_id"))?;
    let (mut room_id, mut date, mut slot) = (None, None, None);
    collect_entry_filters(sel, &mut room_id, &mut date, &mut slot)?;
    Ok((
        room_id.ok_or(SqlError::MissingFilter("room_id"))?,
        date.ok_or(SqlError::MissingFilter("date"))?,
        slot.ok_or(SqlError::MissingFilter("slot"))?,
    ))
}

fn collect_entry_filters(
    expr: &Expr,
    room_id: &mut Option<Ulid>,
    date: &mut Option<NaiveDate>,
    slot: &mut Option<SlotId>,
) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_entry_filters(left, room_id, date, slot)?;
                collect_entry_filters(right, room_id, date, slot)?;
            }
            ast::BinaryOperator::Eq => match expr_column_name(left).as_deref() {
                Some("room_id") => *room_id = Some(parse_ulid(right)?),
                Some("date") => *date = Some(parse_date(right)?),
                Some("slot") => *slot = Some(parse_slot(right)?),
                _ => {}
            },
            _ => {}
        },
        _ => {}
    }
    Ok(())
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_slot(expr: &Expr) -> Result<SlotId, SqlError> {
    let v = parse_i64(expr)?;
    SlotId::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of slot range")))
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => Ok(s.clone()),
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_opt_string(expr: &Expr) -> Result<Option<String>, SqlError> {
    if let Some(Value::Null) = extract_value(expr) {
        Ok(None)
    } else {
        Ok(Some(parse_string(expr)?))
    }
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_string(expr)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|e| SqlError::Parse(format!("bad date {s:?}: {e}")))
}

fn parse_role(expr: &Expr) -> Result<Role, SqlError> {
    let s = parse_string(expr)?;
    Role::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad role: {s}")))
}

fn parse_entry_status(expr: &Expr) -> Result<EntryStatus, SqlError> {
    let s = parse_string(expr)?;
    EntryStatus::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad entry status: {s}")))
}

fn parse_request_status(expr: &Expr) -> Result<RequestStatus, SqlError> {
    let s = parse_string(expr)?;
    RequestStatus::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad request status: {s}")))
}

fn parse_slot_category(expr: &Expr) -> Result<SlotCategory, SqlError> {
    let s = parse_string(expr)?;
    SlotCategory::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad category: {s}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
