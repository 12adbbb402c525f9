//! Campus records and partial updates.
//!
//! Records serialize to the same JSON shape the dashboard has always
//! persisted (`type`, `iconType`, `bgColor`, `isNew`, `"In Progress"`), so an
//! existing database keeps loading.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Anything stored in a collection keyed by a unique id.
pub trait Record {
    /// The id type.
    type Id: PartialEq + ?Sized;

    /// This record's id.
    fn id(&self) -> &Self::Id;
}

/// Lifecycle state of a [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Awaiting a decision.
    Pending,
    /// Accepted.
    Approved,
    /// Declined.
    Rejected,
    /// Accepted and being worked on.
    #[serde(rename = "In Progress")]
    InProgress,
}

impl RequestStatus {
    /// Every status, in display order.
    pub const ALL: [Self; 4] = [
        Self::Pending,
        Self::Approved,
        Self::Rejected,
        Self::InProgress,
    ];

    /// The persisted label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::InProgress => "In Progress",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().replace(' ', "").to_ascii_lowercase() == normalized)
            .ok_or_else(|| format!("unknown request status: {s}"))
    }
}

/// A service request raised by a student or department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Unique id, `REQ-NNN`.
    pub id: String,
    /// Short description.
    pub title: String,
    /// Category such as `Maintenance` or `IT Support`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Current status.
    pub status: RequestStatus,
    /// Display date.
    pub date: String,
    /// Who raised it.
    pub author: String,
    /// `High`, `Medium` or `Low`.
    pub priority: String,
}

impl Record for Request {
    type Id = str;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Partial update for a [`Request`]. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestPatch {
    /// New title.
    pub title: Option<String>,
    /// New category.
    pub kind: Option<String>,
    /// New status.
    pub status: Option<RequestStatus>,
    /// New display date.
    pub date: Option<String>,
    /// New author.
    pub author: Option<String>,
    /// New priority.
    pub priority: Option<String>,
}

impl RequestPatch {
    /// A patch that only changes the status.
    #[must_use]
    pub fn status(status: RequestStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Merge this patch over `request`.
    #[must_use]
    pub fn apply(&self, request: &Request) -> Request {
        let mut merged = request.clone();
        merge(&mut merged.title, &self.title);
        merge(&mut merged.kind, &self.kind);
        merge(&mut merged.date, &self.date);
        merge(&mut merged.author, &self.author);
        merge(&mut merged.priority, &self.priority);
        if let Some(status) = self.status {
            merged.status = status;
        }
        merged
    }
}

/// A notice shown on the announcements board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    /// Unique id, the creation timestamp in milliseconds.
    pub id: i64,
    /// Headline.
    pub title: String,
    /// Body text.
    pub content: String,
    /// Display date.
    pub date: String,
    /// Who posted it.
    pub author: String,
    /// Icon name used by the board.
    pub icon_type: String,
    /// Category such as `Events` or `System`.
    pub category: String,
    /// Foreground style class.
    pub color: String,
    /// Background style class.
    pub bg_color: String,
    /// Whether the board highlights it as new.
    pub is_new: bool,
}

impl Record for Announcement {
    type Id = i64;

    fn id(&self) -> &i64 {
        &self.id
    }
}

/// Partial update for an [`Announcement`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnouncementPatch {
    /// New headline.
    pub title: Option<String>,
    /// New body text.
    pub content: Option<String>,
    /// New display date.
    pub date: Option<String>,
    /// New author.
    pub author: Option<String>,
    /// New icon name.
    pub icon_type: Option<String>,
    /// New category.
    pub category: Option<String>,
    /// New foreground style.
    pub color: Option<String>,
    /// New background style.
    pub bg_color: Option<String>,
    /// New highlight flag.
    pub is_new: Option<bool>,
}

impl AnnouncementPatch {
    /// Merge this patch over `announcement`.
    #[must_use]
    pub fn apply(&self, announcement: &Announcement) -> Announcement {
        let mut merged = announcement.clone();
        merge(&mut merged.title, &self.title);
        merge(&mut merged.content, &self.content);
        merge(&mut merged.date, &self.date);
        merge(&mut merged.author, &self.author);
        merge(&mut merged.icon_type, &self.icon_type);
        merge(&mut merged.category, &self.category);
        merge(&mut merged.color, &self.color);
        merge(&mut merged.bg_color, &self.bg_color);
        if let Some(is_new) = self.is_new {
            merged.is_new = is_new;
        }
        merged
    }
}

/// An entry on the campus calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampusEvent {
    /// Unique id, `evt-<timestamp>`.
    pub id: String,
    /// Name shown on the calendar.
    pub title: String,
    /// Start date, `YYYY-MM-DD`.
    pub date: String,
    /// End date for multi-day events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    /// Calendar colour.
    pub color: String,
}

impl Record for CampusEvent {
    type Id = str;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Partial update for a [`CampusEvent`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CampusEventPatch {
    /// New name.
    pub title: Option<String>,
    /// New start date.
    pub date: Option<String>,
    /// `Some(Some(d))` sets the end date, `Some(None)` clears it.
    pub end: Option<Option<String>>,
    /// New colour.
    pub color: Option<String>,
}

impl CampusEventPatch {
    /// A patch that renames the event.
    #[must_use]
    pub fn rename(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// A patch that moves the event to new dates.
    #[must_use]
    pub fn reschedule(date: impl Into<String>, end: Option<String>) -> Self {
        Self {
            date: Some(date.into()),
            end: Some(end),
            ..Self::default()
        }
    }

    /// Merge this patch over `event`.
    #[must_use]
    pub fn apply(&self, event: &CampusEvent) -> CampusEvent {
        let mut merged = event.clone();
        merge(&mut merged.title, &self.title);
        merge(&mut merged.date, &self.date);
        merge(&mut merged.color, &self.color);
        if let Some(end) = &self.end {
            merged.end.clone_from(end);
        }
        merged
    }
}

fn merge(field: &mut String, update: &Option<String>) {
    if let Some(value) = update {
        field.clone_from(value);
    }
}

/// Requests shown on first launch.
#[must_use]
pub fn default_requests() -> Vec<Request> {
    fn request(
        id: &str,
        title: &str,
        kind: &str,
        status: RequestStatus,
        date: &str,
        author: &str,
        priority: &str,
    ) -> Request {
        Request {
            id: id.to_string(),
            title: title.to_string(),
            kind: kind.to_string(),
            status,
            date: date.to_string(),
            author: author.to_string(),
            priority: priority.to_string(),
        }
    }

    vec![
        request(
            "REQ-042",
            "Projector Repair - Room 302",
            "Maintenance",
            RequestStatus::Pending,
            "Feb 25, 2026",
            "Alex Johnson",
            "High",
        ),
        request(
            "REQ-041",
            "Tech Symposium Hall Booking",
            "Event",
            RequestStatus::Pending,
            "Feb 24, 2026",
            "Computer Science Club",
            "Medium",
        ),
        request(
            "REQ-040",
            "Wi-Fi Issue in Library",
            "IT Support",
            RequestStatus::InProgress,
            "Feb 23, 2026",
            "Sarah Smith",
            "High",
        ),
        request(
            "REQ-039",
            "Sick Leave Application",
            "Academic",
            RequestStatus::Approved,
            "Feb 20, 2026",
            "Alex Johnson",
            "Low",
        ),
        request(
            "REQ-038",
            "New Lab Equipment Request",
            "Procurement",
            RequestStatus::Rejected,
            "Feb 15, 2026",
            "Chemistry Dept",
            "Medium",
        ),
    ]
}

/// Announcements shown on first launch.
#[must_use]
pub fn default_announcements() -> Vec<Announcement> {
    vec![
        Announcement {
            id: 1,
            title: "Annual Tech Symposium Registration Open".to_string(),
            content: "Registration for the core technical workshops is now open. Seats are limited to 50 students per workshop. Register via the event portal before Feb 28th.".to_string(),
            date: "Feb 25, 2026".to_string(),
            author: "Prof. Davis / CS Dept".to_string(),
            icon_type: "Calendar".to_string(),
            category: "Events".to_string(),
            color: "text-indigo-600".to_string(),
            bg_color: "bg-indigo-100".to_string(),
            is_new: true,
        },
        Announcement {
            id: 2,
            title: "Library Database Maintenance".to_string(),
            content: "The IEEE and ACM digital libraries will be undergoing scheduled maintenance this weekend. Access will be restored by Sunday 8 PM.".to_string(),
            date: "Feb 24, 2026".to_string(),
            author: "Library Admin".to_string(),
            icon_type: "BellRing".to_string(),
            category: "System".to_string(),
            color: "text-amber-600".to_string(),
            bg_color: "bg-amber-100".to_string(),
            is_new: false,
        },
    ]
}

/// Calendar events shown on first launch.
#[must_use]
pub fn default_campus_events() -> Vec<CampusEvent> {
    let event = |id: &str, title: &str, date: &str, end: Option<&str>, color: &str| CampusEvent {
        id: id.to_string(),
        title: title.to_string(),
        date: date.to_string(),
        end: end.map(str::to_string),
        color: color.to_string(),
    };

    vec![
        event("evt-1", "Tech Symposium", "2026-02-28", None, "#4f46e5"),
        event("evt-2", "Midterm Exams", "2026-03-02", Some("2026-03-06"), "#dc2626"),
        event("evt-3", "Guest Lecture", "2026-03-10", None, "#059669"),
    ]
}
