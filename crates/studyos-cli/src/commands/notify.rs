use clap::Subcommand;
use studyos_core::{clock, NotificationKind, NotificationPreference};

use super::{open_engine, print_json, CliError};

#[derive(Subcommand)]
pub enum NotifyAction {
    /// List recent notifications
    List {
        #[arg(long)]
        unread: bool,
        /// Filter by kind
        #[arg(long)]
        kind: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Mark a notification read
    Read { id: i64 },
    /// Dismiss a notification
    Dismiss { id: i64 },
    /// Run one scan pass immediately
    Tick,
    /// Show the preference for a kind
    Pref { kind: String },
    /// Update a preference
    SetPref {
        kind: String,
        #[arg(long)]
        disable: bool,
        /// Quiet window start, HH:MM
        #[arg(long)]
        quiet_start: Option<String>,
        /// Quiet window end, HH:MM
        #[arg(long)]
        quiet_end: Option<String>,
        /// Max per rolling hour
        #[arg(long)]
        limit: Option<u32>,
    },
}

pub fn run(action: NotifyAction) -> Result<(), CliError> {
    let engine = open_engine()?;
    let now = clock::now();

    match action {
        NotifyAction::List {
            unread,
            kind,
            limit,
        } => {
            let kind = kind.as_deref().map(NotificationKind::parse).transpose()?;
            let notifications = engine.notifications_list(kind, unread, limit)?;
            print_json(&notifications)?;
        }
        NotifyAction::Read { id } => print_json(&engine.notification_mark_read(id, now)?)?,
        NotifyAction::Dismiss { id } => print_json(&engine.notification_dismiss(id, now)?)?,
        NotifyAction::Tick => {
            let produced = engine.notifications().tick(now)?;
            eprintln!("{produced} notification(s) produced");
        }
        NotifyAction::Pref { kind } => {
            print_json(&engine.notification_preference(NotificationKind::parse(&kind)?)?)?
        }
        NotifyAction::SetPref {
            kind,
            disable,
            quiet_start,
            quiet_end,
            limit,
        } => {
            let kind = NotificationKind::parse(&kind)?;
            let current = engine.notification_preference(kind)?;
            let pref = NotificationPreference {
                kind,
                enabled: !disable,
                quiet_hours_start: quiet_start.or(current.quiet_hours_start),
                quiet_hours_end: quiet_end.or(current.quiet_hours_end),
                frequency_limit: limit.or(current.frequency_limit),
                channels: current.channels,
            };
            engine.set_notification_preference(&pref)?;
            print_json(&pref)?;
        }
    }

    Ok(())
}
