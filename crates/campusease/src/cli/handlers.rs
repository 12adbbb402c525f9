//! Command handlers for `campusctl`.

use std::io::Write;

use anyhow::{bail, Context as _};
use chrono::{Local, Utc};
use tracing::debug;

use super::{
    AnnouncementsCommand, Command, ConfigCommand, EventsCommand, RequestsCommand, StatusArg,
};
use crate::bus::Change;
use crate::config::Config;
use crate::context::Context;
use crate::models::{Announcement, CampusEvent, Request, RequestStatus};
use crate::storage::Storage;
use crate::store::StoreKeys;

/// Run `command` against the state named by `config`, writing to `out`.
///
/// # Errors
///
/// Returns an error if the database cannot be opened, an id is unknown, or
/// output cannot be written.
pub fn dispatch(config: &Config, command: Command, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        Command::Requests(cmd) => handle_requests(&open(config)?, cmd, out),
        Command::Announcements(cmd) => handle_announcements(&open(config)?, cmd, out),
        Command::Events(cmd) => handle_events(&open(config)?, cmd, out),
        Command::Watch(cmd) => handle_watch(open(config)?, cmd.json),
        Command::Status(cmd) => handle_status(config, &open(config)?, cmd.json, out),
        Command::Reset(cmd) => handle_reset(config, cmd.yes, out),
        Command::Config(cmd) => handle_config(config, cmd, out),
    }
}

fn open(config: &Config) -> anyhow::Result<Context> {
    Context::open(config).with_context(|| {
        format!(
            "failed to open shared state at {}",
            config.database_path().display()
        )
    })
}

/// Next request id, continuing from the highest `REQ-NNN` in use.
///
/// # Errors
///
/// Returns an error if the numbering is exhausted.
pub fn next_request_id(requests: &[Request]) -> anyhow::Result<String> {
    let highest = requests
        .iter()
        .filter_map(|r| r.id.strip_prefix("REQ-")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    let Some(next) = highest.checked_add(1) else {
        bail!("request numbering exhausted at REQ-{highest}");
    };
    Ok(format!("REQ-{next:03}"))
}

/// Next announcement id: the current time in milliseconds, bumped past any
/// id already in use.
///
/// # Errors
///
/// Returns an error if the highest id in use is already `i64::MAX`.
pub fn next_announcement_id(announcements: &[Announcement]) -> anyhow::Result<i64> {
    let now = Utc::now().timestamp_millis();
    match announcements.iter().map(|a| a.id).max() {
        Some(highest) if highest >= now => highest
            .checked_add(1)
            .with_context(|| format!("no announcement id left after {highest}")),
        _ => Ok(now),
    }
}

/// Next calendar event id, `evt-<milliseconds>`.
///
/// # Errors
///
/// Returns an error if no free stamp is left after the current time.
pub fn next_event_id(events: &[CampusEvent]) -> anyhow::Result<String> {
    let mut stamp = Utc::now().timestamp_millis();
    loop {
        let id = format!("evt-{stamp}");
        if !events.iter().any(|e| e.id == id) {
            return Ok(id);
        }
        stamp = stamp.checked_add(1).context("no calendar event id left")?;
    }
}

fn today_display() -> String {
    Local::now().format("%b %-d, %Y").to_string()
}

fn today_iso() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

fn handle_requests(
    context: &Context,
    cmd: RequestsCommand,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let store = context.store();

    match cmd {
        RequestsCommand::List { status, json } => {
            let wanted = status.map(RequestStatus::from);
            let requests: Vec<Request> = store
                .requests()
                .iter()
                .filter(|r| wanted.map_or(true, |s| r.status == s))
                .cloned()
                .collect();

            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&requests)?)?;
            } else {
                writeln!(
                    out,
                    "{:<8}  {:<11}  {:<8}  {:<12}  TITLE",
                    "ID", "STATUS", "PRIORITY", "TYPE"
                )?;
                for r in &requests {
                    writeln!(
                        out,
                        "{:<8}  {:<11}  {:<8}  {:<12}  {}",
                        r.id, r.status, r.priority, r.kind, r.title
                    )?;
                }
            }
        }
        RequestsCommand::Add(new) => {
            let request = Request {
                id: next_request_id(&store.requests())?,
                title: new.title,
                kind: new.kind,
                status: RequestStatus::Pending,
                date: new.date.unwrap_or_else(today_display),
                author: new.author,
                priority: new.priority,
            };
            let id = request.id.clone();
            store.add_request(request);
            writeln!(out, "Added request {id}")?;
        }
        RequestsCommand::Status { id, status } => {
            require(store.requests().iter().any(|r| r.id == id), "request", &id)?;
            let status = RequestStatus::from(status);
            store.update_request_status(&id, status);
            writeln!(out, "Request {id} is now {status}")?;
        }
        RequestsCommand::Update { id, fields } => {
            require(store.requests().iter().any(|r| r.id == id), "request", &id)?;
            store.update_request(&id, &fields.into());
            writeln!(out, "Updated request {id}")?;
        }
    }
    Ok(())
}

fn handle_announcements(
    context: &Context,
    cmd: AnnouncementsCommand,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let store = context.store();

    match cmd {
        AnnouncementsCommand::List { json } => {
            let announcements = store.announcements();
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&*announcements)?)?;
            } else {
                for a in announcements.iter() {
                    let marker = if a.is_new { " [new]" } else { "" };
                    writeln!(out, "#{} {}{}", a.id, a.title, marker)?;
                    writeln!(out, "    {} | {} | {}", a.category, a.author, a.date)?;
                    if !a.content.is_empty() {
                        writeln!(out, "    {}", a.content)?;
                    }
                }
            }
        }
        AnnouncementsCommand::Add(new) => {
            let announcement = Announcement {
                id: next_announcement_id(&store.announcements())?,
                title: new.title,
                content: new.content,
                date: today_display(),
                author: new.author,
                icon_type: new.icon,
                category: new.category,
                color: new.color,
                bg_color: new.bg_color,
                is_new: true,
            };
            let id = announcement.id;
            store.add_announcement(announcement);
            writeln!(out, "Posted announcement {id}")?;
        }
        AnnouncementsCommand::Update { id, fields } => {
            require(
                store.announcements().iter().any(|a| a.id == id),
                "announcement",
                &id.to_string(),
            )?;
            store.update_announcement(id, &fields.into());
            writeln!(out, "Updated announcement {id}")?;
        }
    }
    Ok(())
}

fn handle_events(
    context: &Context,
    cmd: EventsCommand,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let store = context.store();

    match cmd {
        EventsCommand::List { json } => {
            let events = store.campus_events();
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&*events)?)?;
            } else {
                for e in events.iter() {
                    let span = match &e.end {
                        Some(end) => format!("{} .. {end}", e.date),
                        None => e.date.clone(),
                    };
                    writeln!(out, "{:<24}  {:<24}  {}", e.id, span, e.title)?;
                }
            }
        }
        EventsCommand::Add(new) => {
            let event = CampusEvent {
                id: next_event_id(&store.campus_events())?,
                title: new.title,
                date: new.date.unwrap_or_else(today_iso),
                end: new.end,
                color: new.color,
            };
            let id = event.id.clone();
            store.add_campus_event(event);
            writeln!(out, "Added event {id}")?;
        }
        EventsCommand::Update { id, fields } => {
            require(store.campus_events().iter().any(|e| e.id == id), "event", &id)?;
            store.update_campus_event(&id, &fields.into());
            writeln!(out, "Updated event {id}")?;
        }
        EventsCommand::Remove { id } => {
            require(store.campus_events().iter().any(|e| e.id == id), "event", &id)?;
            store.remove_campus_event(&id);
            writeln!(out, "Removed event {id}")?;
        }
    }
    Ok(())
}

fn require(found: bool, what: &str, id: &str) -> anyhow::Result<()> {
    if !found {
        bail!("no {what} with id '{id}'");
    }
    Ok(())
}

fn handle_watch(mut context: Context, json: bool) -> anyhow::Result<()> {
    let Some(mut watcher) = context.take_watcher() else {
        bail!("cross-context sync is disabled (sync.cross_context = false)");
    };

    let _subscription = context.bus().subscribe(move |change| {
        if json {
            println!("{}", change_json(change));
        } else {
            println!(
                "[{}] {} changed by {} ({} bytes, {})",
                change.published_at.with_timezone(&Local).format("%H:%M:%S"),
                change.key,
                change.origin,
                change.value.len(),
                &change.digest()[..12]
            );
        }
    });

    eprintln!(
        "Watching for changes from other contexts (context {}). Press Ctrl-C to stop.",
        context.origin()
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let handle = watcher.stop_handle();
    runtime.block_on(async move {
        tokio::select! {
            () = watcher.run() => Ok(()),
            signal = tokio::signal::ctrl_c() => {
                handle.stop();
                debug!("Interrupted, stopping watcher");
                signal.context("failed to listen for Ctrl-C")
            }
        }
    })
}

fn change_json(change: &Change) -> serde_json::Value {
    serde_json::json!({
        "key": change.key,
        "origin": change.origin,
        "published_at": change.published_at.to_rfc3339(),
        "digest": change.digest(),
        "value": serde_json::from_str::<serde_json::Value>(&change.value)
            .unwrap_or_else(|_| serde_json::Value::String(change.value.clone())),
    })
}

fn handle_status(
    config: &Config,
    context: &Context,
    json: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let stats = context.storage().stats()?;
    let entries = context.storage().entries()?;
    let store = context.store();

    if json {
        let entries: Vec<_> = entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "key": e.key,
                    "digest": e.digest,
                    "bytes": e.len,
                    "updated_at": e.updated_at.to_rfc3339(),
                })
            })
            .collect();
        let status = serde_json::json!({
            "database_path": config.database_path(),
            "context": context.origin(),
            "cross_context": context.bus().is_cross_context(),
            "requests": store.requests().len(),
            "announcements": store.announcements().len(),
            "events": store.campus_events().len(),
            "entries": entries,
            "change_log": {
                "entries": stats.change_count,
                "latest_seq": stats.latest_change_seq,
                "newest": stats.newest_change.map(|t| t.to_rfc3339()),
            },
            "db_size_bytes": stats.db_size_bytes,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&status)?)?;
        return Ok(());
    }

    writeln!(out, "campusctl status")?;
    writeln!(out, "----------------")?;
    writeln!(out, "Database:      {}", config.database_path().display())?;
    writeln!(out, "Context:       {}", context.origin())?;
    writeln!(
        out,
        "Cross-context: {}",
        if context.bus().is_cross_context() { "on" } else { "off" }
    )?;
    writeln!(
        out,
        "Collections:   {} requests, {} announcements, {} events",
        store.requests().len(),
        store.announcements().len(),
        store.campus_events().len()
    )?;
    writeln!(out)?;
    for e in &entries {
        writeln!(
            out,
            "  {:<28} {:>8} bytes  {}  {}",
            e.key,
            e.len,
            &e.digest[..12],
            e.updated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        )?;
    }
    writeln!(out)?;
    writeln!(
        out,
        "Change log:    {} entries (latest #{})",
        stats.change_count, stats.latest_change_seq
    )?;
    writeln!(out, "Size:          {} bytes", stats.db_size_bytes)?;
    Ok(())
}

fn handle_reset(config: &Config, yes: bool, out: &mut impl Write) -> anyhow::Result<()> {
    if !yes {
        writeln!(
            out,
            "This will remove all persisted requests, announcements and events."
        )?;
        writeln!(out, "Defaults are reinstalled the next time a context opens.")?;
        writeln!(out, "Use --yes to confirm.")?;
        return Ok(());
    }

    config.validate()?;
    let storage = Storage::open(config.database_path())?;
    let keys = StoreKeys::with_namespace(&config.storage.namespace);

    let mut removed = 0;
    for key in keys.all() {
        if storage.remove_entry(key)? {
            removed += 1;
        }
    }
    writeln!(out, "Removed {removed} persisted collections.")?;
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand, out: &mut impl Write) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(config)?)?;
            } else {
                writeln!(out, "Current Configuration")?;
                writeln!(out, "=====================")?;
                writeln!(out)?;
                writeln!(out, "[Storage]")?;
                writeln!(out, "  Database path:      {}", config.database_path().display())?;
                writeln!(out, "  Namespace:          {}", config.storage.namespace)?;
                writeln!(out)?;
                writeln!(out, "[Sync]")?;
                writeln!(out, "  Cross-context:      {}", config.sync.cross_context)?;
                writeln!(out, "  Poll interval (ms): {}", config.sync.poll_interval_ms)?;
                writeln!(
                    out,
                    "  Change-log entries: {}",
                    config
                        .change_log_retention()
                        .map_or_else(|| "unlimited".to_string(), |n| n.to_string())
                )?;
            }
        }
        ConfigCommand::Path => {
            writeln!(out, "{}", Config::default_config_path().display())?;
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            writeln!(out, "Validating configuration: {}", path.display())?;
            match Config::load_from(Some(path)) {
                Ok(_) => writeln!(out, "Configuration is valid.")?,
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{
        AnnouncementFields, CampusEventFields, NewAnnouncement, NewCampusEvent, NewRequest,
        RequestFields, ResetCommand, StatusCommand,
    };
    use crate::models::default_requests;

    fn temp_config(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.storage.database_path = Some(dir.path().join("campusease.db"));
        config
    }

    fn run(config: &Config, command: Command) -> anyhow::Result<String> {
        let mut out = Vec::new();
        dispatch(config, command, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_next_request_id_continues_numbering() {
        assert_eq!(next_request_id(&default_requests()).unwrap(), "REQ-043");
        assert_eq!(next_request_id(&[]).unwrap(), "REQ-001");
    }

    #[test]
    fn test_next_request_id_ignores_foreign_ids() {
        let mut requests = default_requests();
        requests[0].id = "TICKET-9000".to_string();
        assert_eq!(next_request_id(&requests).unwrap(), "REQ-042");
    }

    #[test]
    fn test_next_request_id_reports_exhaustion() {
        let mut requests = default_requests();
        requests[0].id = format!("REQ-{}", u32::MAX);
        assert!(next_request_id(&requests).is_err());

        requests[0].id = format!("REQ-{}", u32::MAX - 1);
        assert_eq!(next_request_id(&requests).unwrap(), format!("REQ-{}", u32::MAX));
    }

    #[test]
    fn test_next_announcement_id_is_unique() {
        let mut announcement = crate::models::default_announcements().remove(0);
        announcement.id = i64::MAX - 1;
        assert_eq!(next_announcement_id(&[announcement]).unwrap(), i64::MAX);

        let fresh = next_announcement_id(&[]).unwrap();
        assert!(fresh > 1_700_000_000_000);
    }

    #[test]
    fn test_next_announcement_id_reports_exhaustion() {
        let mut announcement = crate::models::default_announcements().remove(0);
        announcement.id = i64::MAX;
        assert!(next_announcement_id(&[announcement]).is_err());
    }

    #[test]
    fn test_next_event_id_skips_taken() {
        let first = next_event_id(&[]).unwrap();
        assert!(first.starts_with("evt-"));

        let taken = CampusEvent {
            id: first.clone(),
            title: "t".to_string(),
            date: "2026-01-01".to_string(),
            end: None,
            color: "#000".to_string(),
        };
        assert_ne!(next_event_id(&[taken]).unwrap(), first);
    }

    #[test]
    fn test_requests_add_then_list() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);

        let added = run(
            &config,
            Command::Requests(RequestsCommand::Add(NewRequest {
                title: "Broken chair".to_string(),
                kind: "Maintenance".to_string(),
                author: "Sam".to_string(),
                priority: "Low".to_string(),
                date: Some("Mar 1, 2026".to_string()),
            })),
        )
        .unwrap();
        assert_eq!(added.trim(), "Added request REQ-043");

        let listed = run(
            &config,
            Command::Requests(RequestsCommand::List {
                status: Some(StatusArg::Pending),
                json: true,
            }),
        )
        .unwrap();
        let requests: Vec<Request> = serde_json::from_str(&listed).unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].id, "REQ-043");
        assert_eq!(requests[0].date, "Mar 1, 2026");
    }

    #[test]
    fn test_requests_status_and_update() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);

        run(
            &config,
            Command::Requests(RequestsCommand::Status {
                id: "REQ-041".to_string(),
                status: StatusArg::Approved,
            }),
        )
        .unwrap();
        run(
            &config,
            Command::Requests(RequestsCommand::Update {
                id: "REQ-041".to_string(),
                fields: RequestFields {
                    priority: Some("High".to_string()),
                    ..RequestFields::default()
                },
            }),
        )
        .unwrap();

        let context = Context::open(&config).unwrap();
        let requests = context.store().requests();
        let request = requests.iter().find(|r| r.id == "REQ-041").unwrap();
        assert_eq!(request.status, RequestStatus::Approved);
        assert_eq!(request.priority, "High");
    }

    #[test]
    fn test_unknown_id_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);

        let err = run(
            &config,
            Command::Requests(RequestsCommand::Status {
                id: "REQ-999".to_string(),
                status: StatusArg::Approved,
            }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("REQ-999"));

        let err = run(
            &config,
            Command::Events(EventsCommand::Remove {
                id: "evt-404".to_string(),
            }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("evt-404"));
    }

    #[test]
    fn test_announcements_add_and_update() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);

        run(
            &config,
            Command::Announcements(AnnouncementsCommand::Add(NewAnnouncement {
                title: "Policy update".to_string(),
                content: "Read the portal.".to_string(),
                author: "Administration".to_string(),
                category: "Notice".to_string(),
                icon: "FileText".to_string(),
                color: "text-blue-600".to_string(),
                bg_color: "bg-blue-100".to_string(),
            })),
        )
        .unwrap();
        run(
            &config,
            Command::Announcements(AnnouncementsCommand::Update {
                id: 1,
                fields: AnnouncementFields {
                    is_new: Some(false),
                    ..AnnouncementFields::default()
                },
            }),
        )
        .unwrap();

        let context = Context::open(&config).unwrap();
        let announcements = context.store().announcements();
        assert_eq!(announcements.len(), 3);
        assert_eq!(announcements[0].title, "Policy update");
        assert!(announcements[0].is_new);
        assert!(!announcements[1].is_new);
    }

    #[test]
    fn test_events_add_update_remove() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);

        run(
            &config,
            Command::Events(EventsCommand::Add(NewCampusEvent {
                title: "Open Day".to_string(),
                date: Some("2026-04-01".to_string()),
                end: None,
                color: "#4f46e5".to_string(),
            })),
        )
        .unwrap();
        run(
            &config,
            Command::Events(EventsCommand::Update {
                id: "evt-2".to_string(),
                fields: CampusEventFields {
                    clear_end: true,
                    ..CampusEventFields::default()
                },
            }),
        )
        .unwrap();
        run(
            &config,
            Command::Events(EventsCommand::Remove {
                id: "evt-1".to_string(),
            }),
        )
        .unwrap();

        let listed = run(&config, Command::Events(EventsCommand::List { json: true })).unwrap();
        let events: Vec<CampusEvent> = serde_json::from_str(&listed).unwrap();
        let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], "evt-2");
        assert!(events[0].end.is_none());
        assert_eq!(events[2].title, "Open Day");
    }

    #[test]
    fn test_status_json() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);

        let output = run(&config, Command::Status(StatusCommand { json: true })).unwrap();
        let status: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(status["requests"], 5);
        assert_eq!(status["entries"].as_array().unwrap().len(), 3);
        assert_eq!(status["cross_context"], true);
    }

    #[test]
    fn test_reset_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);
        run(
            &config,
            Command::Events(EventsCommand::Remove {
                id: "evt-1".to_string(),
            }),
        )
        .unwrap();

        let output = run(&config, Command::Reset(ResetCommand { yes: false })).unwrap();
        assert!(output.contains("--yes"));
        assert_eq!(Context::open(&config).unwrap().store().campus_events().len(), 2);

        let output = run(&config, Command::Reset(ResetCommand { yes: true })).unwrap();
        assert!(output.contains("Removed 3"));
        assert_eq!(Context::open(&config).unwrap().store().campus_events().len(), 3);
    }

    #[test]
    fn test_watch_without_sync_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = temp_config(&dir);
        config.sync.cross_context = false;

        let result = run(&config, Command::Watch(crate::cli::WatchCommand { json: false }));
        assert!(result.is_err());
    }

    #[test]
    fn test_change_json_embeds_value() {
        let change = Change::new(
            "campusease_events",
            r#"[{"id":"evt-1"}]"#,
            crate::ContextId::new(),
        );
        let json = change_json(&change);
        assert_eq!(json["value"][0]["id"], "evt-1");

        let raw = Change::new("k", "not json", crate::ContextId::new());
        assert_eq!(change_json(&raw)["value"], "not json");
    }

    #[test]
    fn test_config_show_json() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);

        let output = run(&config, Command::Config(ConfigCommand::Show { json: true })).unwrap();
        let shown: Config = serde_json::from_str(&output).unwrap();
        assert_eq!(shown, config);
    }
}
