//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::models::{AnnouncementPatch, CampusEventPatch, RequestPatch, RequestStatus};

/// Request commands.
#[derive(Debug, Subcommand)]
pub enum RequestsCommand {
    /// List requests, newest first
    List {
        /// Only show requests with this status
        #[arg(short, long, value_enum)]
        status: Option<StatusArg>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Submit a new request
    Add(NewRequest),

    /// Move a request to a new status
    Status {
        /// Request id, e.g. REQ-042
        id: String,

        /// The new status
        #[arg(value_enum)]
        status: StatusArg,
    },

    /// Edit fields of a request
    Update {
        /// Request id, e.g. REQ-042
        id: String,

        #[command(flatten)]
        fields: RequestFields,
    },
}

/// Fields of a new request.
#[derive(Debug, Args)]
pub struct NewRequest {
    /// Short description of the request
    pub title: String,

    /// Request category
    #[arg(short = 't', long = "type", default_value = "Event")]
    pub kind: String,

    /// Who submitted the request
    #[arg(short, long, default_value = "Current User")]
    pub author: String,

    /// Priority label
    #[arg(short, long, default_value = "Medium")]
    pub priority: String,

    /// Display date (defaults to today, e.g. "Feb 25, 2026")
    #[arg(short, long)]
    pub date: Option<String>,
}

/// Editable request fields.
#[derive(Debug, Default, Args)]
pub struct RequestFields {
    /// New title
    #[arg(long)]
    pub title: Option<String>,

    /// New category
    #[arg(long = "type")]
    pub kind: Option<String>,

    /// New status
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,

    /// New display date
    #[arg(long)]
    pub date: Option<String>,

    /// New author
    #[arg(long)]
    pub author: Option<String>,

    /// New priority label
    #[arg(long)]
    pub priority: Option<String>,
}

impl From<RequestFields> for RequestPatch {
    fn from(fields: RequestFields) -> Self {
        Self {
            title: fields.title,
            kind: fields.kind,
            status: fields.status.map(RequestStatus::from),
            date: fields.date,
            author: fields.author,
            priority: fields.priority,
        }
    }
}

/// Announcement commands.
#[derive(Debug, Subcommand)]
pub enum AnnouncementsCommand {
    /// List announcements, newest first
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Post a new announcement
    Add(NewAnnouncement),

    /// Edit fields of an announcement
    Update {
        /// Announcement id
        id: i64,

        #[command(flatten)]
        fields: AnnouncementFields,
    },
}

/// Fields of a new announcement.
#[derive(Debug, Args)]
pub struct NewAnnouncement {
    /// Headline
    pub title: String,

    /// Body text
    #[arg(short = 'b', long, default_value = "")]
    pub content: String,

    /// Who posted it
    #[arg(short, long, default_value = "Administration")]
    pub author: String,

    /// Category label
    #[arg(long, default_value = "Notice")]
    pub category: String,

    /// Icon name shown by the dashboard
    #[arg(long, default_value = "FileText")]
    pub icon: String,

    /// Text colour class
    #[arg(long, default_value = "text-blue-600")]
    pub color: String,

    /// Background colour class
    #[arg(long, default_value = "bg-blue-100")]
    pub bg_color: String,
}

/// Editable announcement fields.
#[derive(Debug, Default, Args)]
pub struct AnnouncementFields {
    /// New headline
    #[arg(long)]
    pub title: Option<String>,

    /// New body text
    #[arg(long)]
    pub content: Option<String>,

    /// New display date
    #[arg(long)]
    pub date: Option<String>,

    /// New author
    #[arg(long)]
    pub author: Option<String>,

    /// New icon name
    #[arg(long)]
    pub icon: Option<String>,

    /// New category label
    #[arg(long)]
    pub category: Option<String>,

    /// New text colour class
    #[arg(long)]
    pub color: Option<String>,

    /// New background colour class
    #[arg(long)]
    pub bg_color: Option<String>,

    /// Mark as new or seen
    #[arg(long)]
    pub is_new: Option<bool>,
}

impl From<AnnouncementFields> for AnnouncementPatch {
    fn from(fields: AnnouncementFields) -> Self {
        Self {
            title: fields.title,
            content: fields.content,
            date: fields.date,
            author: fields.author,
            icon_type: fields.icon,
            category: fields.category,
            color: fields.color,
            bg_color: fields.bg_color,
            is_new: fields.is_new,
        }
    }
}

/// Calendar event commands.
#[derive(Debug, Subcommand)]
pub enum EventsCommand {
    /// List calendar events in calendar order
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add an event to the calendar
    Add(NewCampusEvent),

    /// Rename or reschedule an event
    Update {
        /// Event id, e.g. evt-1
        id: String,

        #[command(flatten)]
        fields: CampusEventFields,
    },

    /// Remove an event from the calendar
    Remove {
        /// Event id, e.g. evt-1
        id: String,
    },
}

/// Fields of a new calendar event.
#[derive(Debug, Args)]
pub struct NewCampusEvent {
    /// Event name
    pub title: String,

    /// Start date as YYYY-MM-DD (defaults to today)
    #[arg(short, long)]
    pub date: Option<String>,

    /// Exclusive end date as YYYY-MM-DD
    #[arg(short, long)]
    pub end: Option<String>,

    /// Display colour
    #[arg(long, default_value = "#4f46e5")]
    pub color: String,
}

/// Editable calendar event fields.
#[derive(Debug, Default, Args)]
pub struct CampusEventFields {
    /// New name
    #[arg(long)]
    pub title: Option<String>,

    /// New start date
    #[arg(long)]
    pub date: Option<String>,

    /// New end date
    #[arg(long, conflicts_with = "clear_end")]
    pub end: Option<String>,

    /// Make this a single-day event
    #[arg(long)]
    pub clear_end: bool,

    /// New display colour
    #[arg(long)]
    pub color: Option<String>,
}

impl From<CampusEventFields> for CampusEventPatch {
    fn from(fields: CampusEventFields) -> Self {
        let end = if fields.clear_end {
            Some(None)
        } else {
            fields.end.map(Some)
        };

        Self {
            title: fields.title,
            date: fields.date,
            end,
            color: fields.color,
        }
    }
}

/// Watch command arguments.
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Print one JSON object per change
    #[arg(short, long)]
    pub json: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Reset command arguments.
#[derive(Debug, Args)]
pub struct ResetCommand {
    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Request status argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    /// Awaiting review
    Pending,
    /// Accepted
    Approved,
    /// Declined
    Rejected,
    /// Being worked on
    InProgress,
}

impl From<StatusArg> for RequestStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Pending => Self::Pending,
            StatusArg::Approved => Self::Approved,
            StatusArg::Rejected => Self::Rejected,
            StatusArg::InProgress => Self::InProgress,
        }
    }
}
