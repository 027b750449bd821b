// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Line-oriented console — stands in for the upload dropzone, the document
// viewer, and the panic button.  One process is one session: the session
// key lives exactly as long as the console runs.

use std::path::PathBuf;

use redactor_core::human_errors::{Severity, humanize_error};
use redactor_core::types::Lookup;
use redactor_core::RedactorError;
use redactor_security::{generate_hash, verify_hash};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::services::app_services::AppServices;

const HELP: &str = "\
commands:
  upload <doc-id> <path>      encrypt a file into the cache
  view <doc-id> [out-path]    decrypt a cached document (optionally write it out)
  preview <doc-id>            spill a cached document to the scratch area
  remove <doc-id>             drop one cached document
  list                        list cached document ids
  sweep                       remove expired entries
  session                     show the session key state
  rotate                      start a new session key (invalidates the cache)
  hash <path>                 SHA-256 (base64) of a file
  verify <path> <hash>        check a file against a digest
  note <key> <text...>        keep session-scoped state
  notes                       list session-scoped state
  panic                       wipe everything now
  help | quit";

/// One parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upload { document_id: String, path: PathBuf },
    View { document_id: String, out: Option<PathBuf> },
    Preview { document_id: String },
    Remove { document_id: String },
    List,
    Sweep,
    Session,
    Rotate,
    Hash { path: PathBuf },
    Verify { path: PathBuf, expected: String },
    Note { key: String, text: String },
    Notes,
    Panic,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match (verb, args.as_slice()) {
            ("upload", [id, path]) => Self::Upload {
                document_id: (*id).to_owned(),
                path: PathBuf::from(path),
            },
            ("view", [id]) => Self::View {
                document_id: (*id).to_owned(),
                out: None,
            },
            ("view", [id, out]) => Self::View {
                document_id: (*id).to_owned(),
                out: Some(PathBuf::from(out)),
            },
            ("preview", [id]) => Self::Preview {
                document_id: (*id).to_owned(),
            },
            ("remove", [id]) => Self::Remove {
                document_id: (*id).to_owned(),
            },
            ("list", []) => Self::List,
            ("sweep", []) => Self::Sweep,
            ("session", []) => Self::Session,
            ("rotate", []) => Self::Rotate,
            ("hash", [path]) => Self::Hash {
                path: PathBuf::from(path),
            },
            ("verify", [path, expected]) => Self::Verify {
                path: PathBuf::from(path),
                expected: (*expected).to_owned(),
            },
            ("note", [key, text @ ..]) if !text.is_empty() => Self::Note {
                key: (*key).to_owned(),
                text: text.join(" "),
            },
            ("notes", []) => Self::Notes,
            ("panic", []) => Self::Panic,
            ("help", []) => Self::Help,
            ("quit" | "exit", []) => Self::Quit,
            _ => return Err(format!("unrecognised command: {line}")),
        };
        Ok(Some(command))
    }
}

/// Execute one command and return the text to show. `None` means quit.
pub async fn execute(svc: &AppServices, command: Command) -> Option<String> {
    let output = match command {
        Command::Quit => return None,
        Command::Help => HELP.to_owned(),

        Command::Upload { document_id, path } => match svc.upload(document_id, path).await {
            Ok(receipt) => format!(
                "cached {} ({} bytes, sha256 {}) until {}",
                receipt.entry.document_id, receipt.len, receipt.hash, receipt.entry.expires_at
            ),
            Err(e) => render_error(&e),
        },

        Command::View { document_id, out } => {
            match svc.get_cached_document(document_id.clone()).await {
                Lookup::Miss => format!("{document_id}: not cached, fetch it from the source"),
                Lookup::Hit(bytes) => match out {
                    Some(path) => match tokio::fs::write(&path, &bytes).await {
                        Ok(()) => format!("wrote {} bytes to {}", bytes.len(), path.display()),
                        Err(e) => render_error(&RedactorError::from(e)),
                    },
                    None => format!(
                        "{document_id}: {} bytes, sha256 {}",
                        bytes.len(),
                        generate_hash(&bytes)
                    ),
                },
            }
        }

        Command::Preview { document_id } => {
            match svc.get_cached_document(document_id.clone()).await {
                Lookup::Miss => format!("{document_id}: not cached"),
                Lookup::Hit(bytes) => match svc.write_scratch(&document_id, &bytes) {
                    Ok(Some(path)) => format!("preview at {}", path.display()),
                    Ok(None) => "scratch area disabled".to_owned(),
                    Err(e) => render_error(&e),
                },
            }
        }

        Command::Remove { document_id } => {
            match svc.remove_cached_document(document_id.clone()).await {
                Ok(()) => format!("{document_id}: removed"),
                Err(e) => render_error(&e),
            }
        }

        Command::List => match svc.cached_document_ids().await {
            Ok(ids) if ids.is_empty() => "cache is empty".to_owned(),
            Ok(ids) => ids
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => render_error(&e),
        },

        Command::Sweep => match svc.sweep_expired().await {
            Ok(n) => format!("swept {n} expired entries"),
            Err(e) => render_error(&e),
        },

        Command::Session => {
            let info = svc.session_info();
            match (info.session_id, info.created_at) {
                (Some(id), Some(at)) => format!("session {id}, key created {at}"),
                _ => "no session key".to_owned(),
            }
        }

        Command::Rotate => match svc.initialize_session() {
            Ok(info) => format!(
                "new session {}; previously cached documents are no longer readable",
                info.session_id.map(|id| id.to_string()).unwrap_or_default()
            ),
            Err(e) => render_error(&e),
        },

        Command::Hash { path } => match tokio::fs::read(&path).await {
            Ok(bytes) => generate_hash(&bytes),
            Err(e) => render_error(&RedactorError::from(e)),
        },

        Command::Verify { path, expected } => match tokio::fs::read(&path).await {
            Ok(bytes) if verify_hash(&bytes, &expected) => "match".to_owned(),
            Ok(_) => "MISMATCH".to_owned(),
            Err(e) => render_error(&RedactorError::from(e)),
        },

        Command::Note { key, text } => match svc.set_transient(&key, &text) {
            Ok(()) => format!("noted {key}"),
            Err(e) => render_error(&e),
        },

        Command::Notes => match svc.transient_entries() {
            Ok(entries) if entries.is_empty() => "no notes".to_owned(),
            Ok(entries) => entries
                .iter()
                .map(|(k, v)| format!("{k} = {v}"))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => render_error(&e),
        },

        Command::Panic => match svc.panic_clear().await {
            Ok(report) => format!(
                "wiped: {} cached documents, {} notes, {} scratch files, key destroyed: {}",
                report.entries_removed,
                report.transient_removed,
                report.scratch_removed,
                report.key_destroyed
            ),
            Err(e) => render_error(&e),
        },
    };
    Some(output)
}

fn render_error(err: &RedactorError) -> String {
    let human = humanize_error(err);
    let banner = match human.severity {
        Severity::Alert => "!!! ALERT !!! ",
        _ => "",
    };
    format!("{banner}{}\n  {}", human.message, human.suggestion)
}

/// Read commands from stdin until EOF or `quit`.
pub async fn run(svc: AppServices) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    stdout
        .write_all(b"redactor secure cache. type 'help' for commands.\n")
        .await?;

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let output = match Command::parse(&line) {
            Ok(None) => continue,
            Ok(Some(command)) => match execute(&svc, command).await {
                Some(output) => output,
                None => break,
            },
            Err(message) => format!("{message}\n{HELP}"),
        };
        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }
    Ok(())
}
