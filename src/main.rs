use std::env;
use std::path;
use std::sync::Arc;

mod collection;
mod error;
mod item;
mod paths;
mod secret;
mod server;
mod service;
mod session;
mod store;

#[tokio::main]
async fn main() -> Result<(), error::Error> {
    let config_folder = env::var("XDG_CONFIG_HOME").unwrap_or_else(|_| "$HOME/.config".to_string());
    let mut config_path = path::PathBuf::new();
    config_path.push(&config_folder);
    config_path.push("secret-service-server");

    let data_folder = env::var("XDG_DATA_HOME")
        .unwrap_or_else(|_| format!("{}/.local/share", env::var("HOME").unwrap_or_default()));
    let mut default_database_path = path::PathBuf::new();
    default_database_path.push(&data_folder);
    default_database_path.push("secret-service-server");
    default_database_path.push("secrets.sqlite3");

    let mut builder = config::Config::builder()
        .set_default("log_level", "INFO")?
        .set_default("dbus_name", "org.freedesktop.secrets")?
        .set_default(
            "database_path",
            default_database_path
                .to_str()
                .expect("default database path is valid UTF-8"),
        )?
        .add_source(config::Environment::with_prefix("sss"));

    builder = if config_path.exists() {
        builder.add_source(config::File::from(config_path))
    } else {
        builder
    };
    let settings = builder.build()?;

    structured_logger::Builder::with_level(
        &settings
            .get_string("log_level")
            .expect("log_level defaults to 'INFO'"),
    )
    .with_target_writer(
        "*",
        structured_logger::async_json::new_writer(tokio::io::stdout()),
    )
    .init();

    let dbus_name: String = settings
        .get("dbus_name")
        .expect("dbus_name defaults to 'org.freedesktop.secrets'");
    let database_path: String = settings
        .get("database_path")
        .expect("database_path has a computed default");

    let store = Arc::new(store::Store::open(path::Path::new(&database_path))?);
    log::info!("Opened secret store at '{database_path}'");

    let server =
        server::SecretServiceServer::new(&dbus_name, store, event_listener::Event::new()).await?;
    server.run().await?;

    Ok(())
}
