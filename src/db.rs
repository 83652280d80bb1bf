//! Database backup and restore pipelines.

use chrono::Local;

use crate::error::Result;
use crate::prompt::PromptEngine;
use crate::session::Session;
use crate::ssh::Transport;

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub db_user: String,
    pub db_name: String,
    /// Short sha of the commit being deployed, embedded in the dump name.
    pub commit: String,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            db_user: "reef".to_string(),
            db_name: "reef".to_string(),
            commit: "head".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackupResult {
    pub dump_name: String,
    pub backup_host: String,
    pub backup_path: String,
}

#[derive(Debug, Clone)]
pub struct RestoreResult {
    pub dump_path: String,
    pub replaced: bool,
}

/// Dump the database on the application host, copy the dump to the backup
/// server, then remove the local dump. Intended to run right before a
/// production deploy.
pub fn backup<T: Transport>(session: &Session<T>, opts: &BackupOptions) -> Result<BackupResult> {
    let service = session.env().require_service_name()?;
    let backup_host = session.env().require_role("backup")?.to_string();

    let stamp = Local::now().format("%d-%m-%Y:%H:%M").to_string();
    let dump = dump_name(&opts.db_name, &stamp, &opts.commit);
    let backup_path = format!("/home/backups/{}-backups", service);

    log_status!("db", "Backing up database {}", opts.db_name);
    session.run_web(&format!(
        "pg_dump -x --no-owner --username={} {} | bzip2 -c > /tmp/{}",
        opts.db_user, opts.db_name, dump
    ))?;

    log_status!("db", "Copying dump to backup server");
    session.run_web(&format!(
        "scp /tmp/{} {}:{}/",
        dump, backup_host, backup_path
    ))?;

    log_status!("db", "Removing local db dump");
    session.run_web(&format!("rm /tmp/{}", dump))?;

    Ok(BackupResult {
        dump_name: dump,
        backup_host,
        backup_path,
    })
}

/// Replace the database from a dump, gated on operator confirmation.
/// A declined confirmation is a clean early exit, not an error.
pub fn restore<T: Transport>(
    session: &Session<T>,
    prompt: &PromptEngine,
    dump_path: &str,
) -> Result<RestoreResult> {
    let db = &session.env().database;

    if !prompt.yes_no(
        &format!("Replace database '{}' with {}?", db.name, dump_path),
        false,
    ) {
        log_status!("db", "Restore declined, leaving database untouched");
        return Ok(RestoreResult {
            dump_path: dump_path.to_string(),
            replaced: false,
        });
    }

    session.run_web(&format!("dropdb --if-exists {}", db.name))?;
    session.run_web(&format!("createdb --owner={} {}", db.user, db.name))?;
    session.run_web(&format!("bunzip2 -c {} | psql -q {}", dump_path, db.name))?;

    Ok(RestoreResult {
        dump_path: dump_path.to_string(),
        replaced: true,
    })
}

fn dump_name(db_name: &str, stamp: &str, commit: &str) -> String {
    format!("{}-{}-{}.sql.bz2", db_name, stamp, commit)
}
