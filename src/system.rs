//! Service control: supervisor restarts, cache flushes, maintenance page.

use crate::error::Result;
use crate::session::Session;
use crate::ssh::{CommandOutput, Transport};

const MAINTENANCE_PAGE: &str = "/var/www/maintenance.html";
const MAINTENANCE_LINK: &str = "/var/www/maintenance_on.html";

/// Gracefully restart gunicorn through supervisor, flush memcache, then ping
/// the site per language so compressed assets are rebuilt. The pings run in
/// the background to avoid blocking the deploy task on first-request work.
pub fn restart_site<T: Transport>(session: &Session<T>) -> Result<()> {
    let service = session.env().require_service_name()?.to_string();
    let host = session.env().require_host()?.to_string();

    log_status!("system", "Restarting service {}", service);
    session.run("supervisorctl reread")?;
    session.run(&format!("supervisorctl restart {}", service))?;

    flush_memcache(session)?;

    for lang in &session.env().languages {
        session.run_bg(&format!("curl -vLk https://{}/{}", host, lang))?;
    }

    Ok(())
}

pub fn flush_memcache<T: Transport>(session: &Session<T>) -> Result<CommandOutput> {
    session.run("echo 'flush_all' | nc -q1 localhost 11211")
}

/// Put the maintenance page up.
pub fn maintenance_on<T: Transport>(session: &Session<T>) -> Result<()> {
    session.run_web(&format!("ln -sf {} {}", MAINTENANCE_PAGE, MAINTENANCE_LINK))?;
    Ok(())
}

/// Take the maintenance page down.
pub fn maintenance_off<T: Transport>(session: &Session<T>) -> Result<()> {
    session.run_web(&format!("rm {}", MAINTENANCE_LINK))?;
    Ok(())
}

/// Run a block of deploy work behind the maintenance page.
/// A failure inside the block propagates and leaves the page up, matching
/// the fail-fast policy: the operator decides when the site comes back.
pub fn with_maintenance<T, R, F>(session: &Session<T>, f: F) -> Result<R>
where
    T: Transport,
    F: FnOnce(&Session<T>) -> Result<R>,
{
    maintenance_on(session)?;
    let result = f(session)?;
    maintenance_off(session)?;
    Ok(result)
}
