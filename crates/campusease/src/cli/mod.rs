//! Command-line interface for campusease.
//!
//! This module provides the CLI structure and command handlers for the
//! `campusctl` binary.

mod commands;
mod handlers;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AnnouncementFields, AnnouncementsCommand, CampusEventFields, ConfigCommand, EventsCommand,
    NewAnnouncement, NewCampusEvent, NewRequest, RequestFields, RequestsCommand, ResetCommand,
    StatusArg, StatusCommand, WatchCommand,
};
pub use handlers::{dispatch, next_announcement_id, next_event_id, next_request_id};

/// campusctl - Inspect and edit the shared CampusEase dashboard state
///
/// Reads and writes the same database as every other CampusEase context on
/// this machine. Changes made here show up in running dashboards.
#[derive(Debug, Parser)]
#[command(name = "campusctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List and edit campus requests
    #[command(subcommand)]
    Requests(RequestsCommand),

    /// List and edit announcements
    #[command(subcommand)]
    Announcements(AnnouncementsCommand),

    /// List and edit calendar events
    #[command(subcommand)]
    Events(EventsCommand),

    /// Print changes made by other contexts until interrupted
    Watch(WatchCommand),

    /// Show database and collection status
    Status(StatusCommand),

    /// Remove persisted collections so defaults are reinstalled
    Reset(ResetCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
