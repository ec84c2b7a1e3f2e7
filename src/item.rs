//! Implementation of `org.freedesktop.Secret.Item`.
//!
//! One lightweight instance is registered per allocated item object path; it
//! carries no per-item state of its own. Every operation reads the invoked
//! path out of the message header and consults the `Store`, which is the
//! single source of truth for item data.
use std::collections::HashMap;
use std::sync::Arc;

use zbus::message::Header;
use zbus::object_server::SignalEmitter;
use zbus::ObjectServer;

use crate::collection::Collection;
use crate::error::Error;
use crate::paths;
use crate::secret::Secret;
use crate::session;
use crate::store::Store;

const DEFAULT_SCHEMA: &str = "org.freedesktop.Secret.Generic";

#[derive(zvariant::DeserializeDict, zvariant::SerializeDict, zvariant::Type)]
#[zvariant(signature = "dict")]
pub struct ItemReadWriteProperties {
    #[zvariant(rename = "org.freedesktop.Secret.Item.Attributes")]
    pub attributes: HashMap<String, String>,
    #[zvariant(rename = "org.freedesktop.Secret.Item.Label")]
    pub label: String,
}

#[derive(Clone)]
pub struct Item {
    store: Arc<Store>,
}

impl Item {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn invoked_path(header: &Header<'_>) -> Result<String, Error> {
        header
            .path()
            .map(|path| path.as_str().to_owned())
            .ok_or_else(|| Error::NoSuchObject("<item path missing from message>".to_owned()))
    }

    /// Emits a Collection-interface signal at the collection owning `item_path`,
    /// looked up via the item's `xdg:collection` attribute. The signal body
    /// carries `item_path` itself, per spec.md's `ItemCreated(o)`/
    /// `ItemChanged(o)`/`ItemDeleted(o)` signatures.
    async fn emit_on_collection<F, Fut>(
        object_server: &ObjectServer,
        item_path: &str,
        attributes: &HashMap<String, String>,
        emit: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(SignalEmitter<'static>, zvariant::ObjectPath<'_>) -> Fut,
        Fut: std::future::Future<Output = zbus::Result<()>>,
    {
        let Some(collection_path) = attributes.get("xdg:collection") else {
            return Ok(());
        };

        let collection_path = zvariant::ObjectPath::try_from(collection_path.as_str())?;
        if let Ok(collection_iface) = object_server.interface::<_, Collection>(&collection_path).await {
            let item = zvariant::ObjectPath::try_from(item_path)?;
            emit(collection_iface.signal_emitter().to_owned(), item).await?;
        }

        Ok(())
    }
}

#[zbus::interface(name = "org.freedesktop.Secret.Item")]
impl Item {
    /// Delete method
    ///
    /// The D-Bus object at `path` stays registered after deletion: it is a
    /// stateless fallback over the Store, so any later call lands back here
    /// and is rejected with `NoSuchObject` once the row is gone, rather than
    /// the generic `UnknownObject` a removed object would raise.
    async fn delete(
        &mut self,
        #[zbus(header)] header: &Header<'_>,
        #[zbus(object_server)] object_server: &ObjectServer,
    ) -> Result<zvariant::ObjectPath<'_>, Error> {
        let path = Self::invoked_path(header)?;
        if !self.store.item_exists(&path)? {
            return Err(Error::NoSuchObject(path));
        }

        let attributes = self.store.get_attributes(&path)?;
        self.store.delete_item(&path)?;

        Self::emit_on_collection(object_server, &path, &attributes, |emitter, item| async move {
            Collection::item_deleted(&emitter, item).await
        })
        .await?;

        log::info!("Deleted item at '{path}'");

        Ok(paths::null_path())
    }

    /// GetSecret method
    async fn get_secret(
        &self,
        session: zvariant::ObjectPath<'_>,
        #[zbus(header)] header: &Header<'_>,
        #[zbus(object_server)] object_server: &ObjectServer,
    ) -> Result<Secret, Error> {
        let path = Self::invoked_path(header)?;
        let (value, content_type) = self
            .store
            .get_secret(&path)?
            .ok_or_else(|| Error::NoSuchObject(path.clone()))?;

        let session_obj = session::resolve(object_server, &session).await?;
        let (ciphertext, parameters) = session_obj.encrypt(&value)?;

        Ok(Secret {
            session: session.into(),
            value: ciphertext,
            parameters,
            content_type,
        })
    }

    /// SetSecret method
    async fn set_secret(
        &mut self,
        secret: Secret,
        #[zbus(header)] header: &Header<'_>,
        #[zbus(object_server)] object_server: &ObjectServer,
    ) -> Result<(), Error> {
        let path = Self::invoked_path(header)?;
        if !self.store.item_exists(&path)? {
            return Err(Error::NoSuchObject(path));
        }

        let session_obj = session::resolve(object_server, &secret.session.as_ref()).await?;
        let plaintext = session_obj.decrypt(&secret.value, &secret.parameters)?;

        self.store.set_secret(&path, &plaintext, &secret.content_type)?;

        let attributes = self.store.get_attributes(&path)?;
        Self::emit_on_collection(object_server, &path, &attributes, |emitter, item| async move {
            Collection::item_changed(&emitter, item).await
        })
        .await?;

        Ok(())
    }

    /// Attributes property
    #[zbus(property)]
    async fn attributes(
        &self,
        #[zbus(header)] header: &Header<'_>,
    ) -> Result<HashMap<String, String>, Error> {
        let path = Self::invoked_path(header)?;
        if !self.store.item_exists(&path)? {
            return Err(Error::NoSuchObject(path));
        }

        let mut attributes = self.store.get_attributes(&path)?;
        attributes
            .entry("xdg:schema".to_owned())
            .or_insert_with(|| DEFAULT_SCHEMA.to_owned());
        Ok(attributes)
    }

    #[zbus(property)]
    async fn set_attributes(
        &mut self,
        value: HashMap<String, String>,
        #[zbus(header)] header: &Header<'_>,
    ) -> Result<(), Error> {
        let path = Self::invoked_path(header)?;
        if !self.store.item_exists(&path)? {
            return Err(Error::NoSuchObject(path));
        }

        self.store.set_attributes(&path, &value)?;
        Ok(())
    }

    /// Created property
    #[zbus(property)]
    async fn created(&self, #[zbus(header)] header: &Header<'_>) -> Result<u64, Error> {
        let path = Self::invoked_path(header)?;
        let metadata = self
            .store
            .get_metadata(&path)?
            .ok_or_else(|| Error::NoSuchObject(path))?;
        Ok(metadata.created)
    }

    /// Label property
    #[zbus(property)]
    async fn label(&self, #[zbus(header)] header: &Header<'_>) -> Result<String, Error> {
        let path = Self::invoked_path(header)?;
        let metadata = self
            .store
            .get_metadata(&path)?
            .ok_or_else(|| Error::NoSuchObject(path))?;
        Ok(metadata.label)
    }

    #[zbus(property)]
    async fn set_label(
        &mut self,
        value: String,
        #[zbus(header)] header: &Header<'_>,
    ) -> Result<(), Error> {
        let path = Self::invoked_path(header)?;
        if !self.store.item_exists(&path)? {
            return Err(Error::NoSuchObject(path));
        }

        self.store.set_metadata_label(&path, &value)?;
        Ok(())
    }

    /// Locked property
    #[zbus(property)]
    fn locked(&self) -> bool {
        false
    }

    /// Modified property
    #[zbus(property)]
    async fn modified(&self, #[zbus(header)] header: &Header<'_>) -> Result<u64, Error> {
        let path = Self::invoked_path(header)?;
        let metadata = self
            .store
            .get_metadata(&path)?
            .ok_or_else(|| Error::NoSuchObject(path))?;
        Ok(metadata.modified)
    }
}
