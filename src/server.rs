use std::sync::Arc;

use crate::error;
use crate::item;
use crate::service;
use crate::store::Store;

pub struct SecretServiceServer {
    connection: zbus::Connection,
    dbus_name: String,
    start_event: event_listener::Event,
    store: Arc<Store>,
}

impl SecretServiceServer {
    pub async fn new(
        dbus_name: &str,
        store: Arc<Store>,
        start_event: event_listener::Event,
    ) -> Result<Self, error::Error> {
        let connection = zbus::Connection::session().await?;

        Ok(Self {
            connection,
            dbus_name: dbus_name.to_owned(),
            start_event,
            store,
        })
    }

    pub async fn run(self) -> Result<(), error::Error> {
        let service_path = service::Service::object_path();
        let service = service::Service::new(Arc::clone(&self.store));
        self.connection
            .object_server()
            .at(service_path.clone(), service)
            .await?;

        log::info!("Serving Secret Service interface.");

        {
            let interface = self
                .connection
                .object_server()
                .interface::<_, service::Service>(&service_path)
                .await?;
            let mut service = interface.get_mut().await;
            service
                .ensure_default_collection(self.connection.object_server())
                .await?;
        }

        self.serve_persisted_items().await?;

        tokio::spawn(service::run_client_gc(self.connection.clone()));

        let dbus_name = self.dbus_name;
        self.connection.request_name(dbus_name.as_str()).await?;

        log::info!("Dbus assigned name '{dbus_name}' to secret service server");

        self.start_event.notify(usize::MAX);

        loop {
            // Handling D-Bus messages is done in the background
            std::future::pending::<()>().await;
        }
    }

    /// Re-registers a bus object for every item the Store already knows
    /// about, so items created by a previous run of the daemon stay
    /// reachable across restarts instead of being orphaned behind the
    /// durable database.
    async fn serve_persisted_items(&self) -> Result<(), error::Error> {
        let object_server = self.connection.object_server();

        for item_path in self.store.all_items()? {
            let path = zvariant::ObjectPath::try_from(item_path.as_str())?;
            object_server
                .at(path, item::Item::new(Arc::clone(&self.store)))
                .await?;
        }

        Ok(())
    }
}
