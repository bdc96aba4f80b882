use std::time::Duration;

use crate::config::parse_cooldown_ms;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::today_param;
use crate::ipc::types::{AppState, OpenScan, Request};
use crate::scan::{ChannelDecoder, ScanReport, ScanSession};
use crate::store::SqliteStore;
use serde_json::json;

use super::attendance::{recorded_json, rejection_json};

fn report_json(report: &ScanReport) -> serde_json::Value {
    match report {
        ScanReport::Debounced { code } => json!({ "outcome": "debounced", "code": code }),
        ScanReport::Recorded(rec) => {
            let mut v = recorded_json(rec);
            v["code"] = json!(rec.student.code);
            v
        }
        ScanReport::Rejected { code, error } => rejection_json(Some(code), error),
    }
}

fn session_json(open: &OpenScan) -> serde_json::Value {
    json!({
        "sessionId": open.session.id(),
        "rosterSize": open.session.roster().len(),
        "cooldownMs": open.session.cooldown().as_millis() as u64,
        "processed": open.session.processed(),
        "debounced": open.session.debounced(),
    })
}

fn handle_scan_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let cooldown = match req.params.get("cooldownMs") {
        None | Some(serde_json::Value::Null) => state.config.scan_cooldown,
        Some(v) => match v.as_u64().and_then(|ms| parse_cooldown_ms(&ms.to_string())) {
            Some(ms) => Duration::from_millis(ms),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "cooldownMs must be an integer between 0 and 60000",
                    None,
                )
            }
        },
    };

    let (decoder, feed) = ChannelDecoder::new();
    let store = SqliteStore::new(conn);
    match ScanSession::open(&state.device, &store, decoder, cooldown) {
        Ok(session) => {
            let open = OpenScan { session, feed };
            let result = session_json(&open);
            state.scan = Some(open);
            ok(&req.id, result)
        }
        Err(e) => err(&req.id, e.outcome(), e.to_string(), None),
    }
}

/// Decoded text from the front-end's camera loop. Accepts `code` or a batch in `codes`.
fn handle_scan_decoded(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(open) = state.scan.as_mut() else {
        return err(&req.id, "no_scan_session", "open a scan session first", None);
    };
    let today = match today_param(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let mut codes: Vec<String> = Vec::new();
    if let Some(c) = req.params.get("code").and_then(|v| v.as_str()) {
        codes.push(c.to_string());
    }
    if let Some(arr) = req.params.get("codes").and_then(|v| v.as_array()) {
        codes.extend(arr.iter().filter_map(|v| v.as_str().map(|s| s.to_string())));
    }
    if codes.is_empty() {
        return HandlerErr::bad_params("missing code").response(&req.id);
    }
    for c in codes {
        if !open.feed.push(c) {
            return err(&req.id, "no_scan_session", "scan session is closed", None);
        }
    }

    let store = SqliteStore::new(conn);
    let reports = open.session.pump(&store, today);
    let rows: Vec<serde_json::Value> = reports.iter().map(report_json).collect();
    ok(&req.id, json!({ "reports": rows }))
}

fn handle_scan_refresh_roster(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(open) = state.scan.as_mut() else {
        return err(&req.id, "no_scan_session", "open a scan session first", None);
    };
    match open.session.refresh_roster(&SqliteStore::new(conn)) {
        Ok(n) => ok(&req.id, json!({ "rosterSize": n })),
        Err(e) => HandlerErr::db("db_query_failed", e).response(&req.id),
    }
}

fn handle_scan_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.scan.as_ref() {
        Some(open) => {
            let mut v = session_json(open);
            v["open"] = json!(true);
            ok(&req.id, v)
        }
        None => ok(&req.id, json!({ "open": false })),
    }
}

fn handle_scan_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    let closed = state.close_scan();
    ok(&req.id, json!({ "closed": closed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scan.open" => Some(handle_scan_open(state, req)),
        "scan.decoded" => Some(handle_scan_decoded(state, req)),
        "scan.refreshRoster" => Some(handle_scan_refresh_roster(state, req)),
        "scan.status" => Some(handle_scan_status(state, req)),
        "scan.close" => Some(handle_scan_close(state, req)),
        _ => None,
    }
}
