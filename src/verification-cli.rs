//! A simple CLI tool for verifying the integrity of an exported audit log.
//! This uses the internal server hash implementation, and is by definition
//! compatible with the output of our API endpoints.

use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::BufReader;

use clap::{Arg, ArgAction, Command};
use mongodb::bson::Bson;
use rocket::serde::json::serde_json;

use chainvote_backend::model::{api::AuditEntryView, db::AuditLogEntry};

const PROGRAM_NAME: &str = "verify-audit";

const ABOUT_TEXT: &str = "Verify the integrity of an exported audit log.

Recomputes every entry's content hash from its action, actor, payload,
and timestamp, and reports any entry whose stored identifier disagrees.

EXIT CODES:
     0: Verification succeeded.
   255: Ran successfully, but verification failed.
 Other: Error.";

const EXPORT_PATH: &str = "EXPORT_PATH";

const EXPORT_PATH_HELP: &str = "The path to a JSON dump of the audit log,\n\
as returned by `GET /audit/export`";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME).about(ABOUT_TEXT).arg(
        Arg::new(EXPORT_PATH)
            .help(EXPORT_PATH_HELP)
            .action(ArgAction::Set)
            .required(true),
    )
}

/// Errors that this program may produce.
#[derive(Debug, Eq, PartialEq)]
enum Error {
    /// IO error described by the inner message.
    IO(String),
    /// Failed to decode the JSON dump.
    Format(String),
    /// Verification failed for the contained entries.
    Verification(Vec<String>),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IO(msg) => write!(f, "IO error: {msg}"),
            Error::Format(msg) => write!(f, "Invalid dump format: {msg}"),
            Error::Verification(failures) => {
                writeln!(f, "{} tampered or corrupt entries:", failures.len())?;
                for failure in failures {
                    writeln!(f, "  {failure}")?;
                }
                Ok(())
            }
        }
    }
}

/// Recompute every entry's content hash and compare it to the stored one.
/// Returns the number of verified entries.
fn verify_entries(views: &[AuditEntryView]) -> Result<usize, Error> {
    let mut failures = Vec::new();
    for view in views {
        let payload = match Bson::try_from(view.payload.clone()) {
            Ok(Bson::Document(payload)) => payload,
            _ => {
                failures.push(format!("{}: payload is not an object", view.entry_hash));
                continue;
            }
        };
        let recomputed =
            AuditLogEntry::content_hash(view.action, &view.actor, &payload, view.timestamp);
        if recomputed != view.entry_hash {
            failures.push(format!(
                "{}: content hash mismatch (recomputed {recomputed})",
                view.entry_hash
            ));
        }
    }
    if failures.is_empty() {
        Ok(views.len())
    } else {
        Err(Error::Verification(failures))
    }
}

fn load_and_verify(path: &str) -> Result<usize, Error> {
    let file = File::open(path).map_err(|err| Error::IO(err.to_string()))?;
    let views: Vec<AuditEntryView> = serde_json::from_reader(BufReader::new(file))
        .map_err(|err| Error::Format(err.to_string()))?;
    verify_entries(&views)
}

fn main() {
    let matches = cli().get_matches();
    let path = matches
        .get_one::<String>(EXPORT_PATH)
        .expect("required argument");

    match load_and_verify(path) {
        Ok(count) => {
            println!("OK: verified {count} audit entries");
        }
        Err(err @ Error::Verification(_)) => {
            eprintln!("{err}");
            std::process::exit(255);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
