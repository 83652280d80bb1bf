//! Django build and migration steps for preparing a deployment.
//!
//! Everything here is a straight shell sequence against the remote checkout;
//! any non-zero exit halts the deploy.

use crate::error::Result;
use crate::session::Session;
use crate::ssh::Transport;

const GEOIP_URL: &str =
    "https://geolite.maxmind.com/download/geoip/database/GeoLiteCountry/GeoIP.dat.gz";

const WHEELHOUSE_URL: &str = "https://stream.onepercentclub.com/wheelhouse/";

/// Build the CSS bundle in the frontend directory.
pub fn generate_css<T: Transport>(session: &Session<T>) -> Result<()> {
    let sass_env = session.env().require_sass_env()?.to_string();

    session.sudo("gem install bourbon neat")?;

    session.run_web(&session.in_frontend("cd sass/lib && bourbon install")?)?;
    session.run_web(&session.in_frontend("cd sass/lib && neat install")?)?;

    session.run_web(&session.in_frontend("npm install")?)?;
    session.run_web(&session.in_frontend(&format!("grunt build:css:all --env={}", sass_env))?)?;

    Ok(())
}

/// Build the Ember frontend for all locales and clients.
pub fn generate_ember<T: Transport>(session: &Session<T>) -> Result<()> {
    session.run_web(&session.in_frontend("bower install")?)?;
    session.run_web(&session.in_frontend("./patch.sh")?)?;
    session.run_web(&session.in_frontend(
        "LOCALES=all CLIENTS=all ./node_modules/.bin/ember build",
    )?)?;

    Ok(())
}

/// Refresh the GeoIP country database in the project directory.
pub fn get_geoip_data<T: Transport>(session: &Session<T>) -> Result<()> {
    session.run_web(&session.in_directory(&format!(
        "curl {} | gunzip - > GeoIP.dat",
        GEOIP_URL
    ))?)?;
    Ok(())
}

/// Prepare a deployment: build assets, install requirements, migrate the
/// shared schema and then every tenant schema, compile translations, and
/// collect static assets.
pub fn prepare<T: Transport>(session: &Session<T>) -> Result<()> {
    let settings = session.env().require_django_settings()?.to_string();

    log_status!("django", "Preparing deployment");

    generate_css(session)?;
    get_geoip_data(session)?;

    let venv = |cmd: &str| session.in_virtualenv(cmd);

    session.run_web(&venv("pip install --upgrade pip==6.0.8")?)?;
    session.run_web(&venv("pip install wheel")?)?;
    session.run_web(&venv(&format!(
        "pip install --use-mirrors --use-wheel --process-dependency-links --find-links={} -r requirements/requirements.txt",
        WHEELHOUSE_URL
    ))?)?;

    // Remove and recompile the .pyc files
    session.run_web(&venv("find . -name \\*.pyc -delete")?)?;
    session.run_web(&venv(&manage("compile_pyc", &settings))?)?;

    // Make sure the web user can read and write the static media dir
    session.sudo(&session.in_directory("chmod a+rw static/media")?)?;

    // Public schema first, then all tenant schemas
    session.run_web(&venv(&manage("sync_schemas --shared --noinput", &settings))?)?;
    session.run_web(&venv(&manage("migrate_schemas --shared --noinput", &settings))?)?;
    session.run_web(&venv(&manage("sync_schemas --noinput", &settings))?)?;
    session.run_web(&venv(&manage("migrate_schemas --noinput", &settings))?)?;

    // Fetch and compile translations
    session.run_web(&venv(&manage("txpull --frontend --deploy --all", &settings))?)?;
    session.run_web(&venv(&manage("compilepo", &settings))?)?;

    generate_ember(session)?;
    session.run_web(&venv(&manage("makejs", &settings))?)?;

    // Default fonts / css directories for the first deploy, before any
    // tenants exist
    session.run_web(&venv("mkdir -p frontend/static/fonts")?)?;
    session.run_web(&venv("mkdir -p frontend/static/css")?)?;

    session.run_web(&venv(&manage(
        "tenant_collectstatic -l -v 0 --noinput",
        &settings,
    ))?)?;

    Ok(())
}

fn manage(command: &str, settings: &str) -> String {
    format!("./manage.py {} --settings={}", command, settings)
}
