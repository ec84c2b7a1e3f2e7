//! Implementation of `org.freedesktop.Secret.Collection`.
//!
//! Membership is expressed purely through each item's `xdg:collection`
//! attribute; the collection itself only caches its label and holds the
//! allocator/store handles needed to create items.
use std::collections::HashMap;
use std::sync::Arc;

use zbus::object_server::SignalEmitter;
use zbus::ObjectServer;

use crate::error::Error;
use crate::item;
use crate::paths::PathAllocator;
use crate::secret::Secret;
use crate::session;
use crate::store::Store;

const DEFAULT_SCHEMA: &str = "org.freedesktop.Secret.Generic";

#[derive(zvariant::DeserializeDict, zvariant::SerializeDict, zvariant::Type)]
#[zvariant(signature = "dict")]
pub struct CollectionReadWriteProperties {
    #[zvariant(rename = "org.freedesktop.Secret.Collection.Label")]
    pub label: String,
}

pub struct Collection {
    store: Arc<Store>,
    allocator: Arc<PathAllocator>,
    /// The alias this collection was created under (e.g. `"default"`). Also
    /// used, bug-for-bug, as the `xdg:collection` filter value by
    /// `search_items` below (see DESIGN.md).
    alias: String,
    label: String,
    object_path: zvariant::OwnedObjectPath,
}

impl Collection {
    pub fn new(
        store: Arc<Store>,
        allocator: Arc<PathAllocator>,
        object_path: zvariant::OwnedObjectPath,
        alias: String,
        label: String,
    ) -> Self {
        Self {
            store,
            allocator,
            alias,
            label,
            object_path,
        }
    }

    pub fn object_path(&self) -> zvariant::OwnedObjectPath {
        self.object_path.clone()
    }
}

#[zbus::interface(name = "org.freedesktop.Secret.Collection")]
impl Collection {
    /// CreateItem method
    async fn create_item(
        &mut self,
        properties: item::ItemReadWriteProperties,
        secret: Secret,
        _replace: bool,
        #[zbus(signal_emitter)] emitter: SignalEmitter<'_>,
        #[zbus(object_server)] object_server: &ObjectServer,
    ) -> Result<(zvariant::OwnedObjectPath, zvariant::ObjectPath<'_>), Error> {
        let session_obj = session::resolve(object_server, &secret.session.as_ref()).await?;
        let plaintext = session_obj.decrypt(&secret.value, &secret.parameters)?;

        let mut attributes = properties.attributes;
        attributes.insert("xdg:collection".to_owned(), self.object_path.as_str().to_owned());
        attributes
            .entry("xdg:schema".to_owned())
            .or_insert_with(|| DEFAULT_SCHEMA.to_owned());

        let item_path = self.allocator.next_item();
        self.store.add_item(
            item_path.as_str(),
            &properties.label,
            attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            &plaintext,
            &secret.content_type,
        )?;

        object_server
            .at(item_path.clone(), item::Item::new(Arc::clone(&self.store)))
            .await?;

        Collection::item_created(&emitter, zvariant::ObjectPath::try_from(item_path.as_str())?).await?;
        log::info!("Created item at '{}'", item_path.as_str());

        Ok((item_path, crate::paths::null_path()))
    }

    /// Delete method
    async fn delete(&mut self) -> Result<zvariant::ObjectPath<'_>, Error> {
        Err(Error::NotSupported("Collection.Delete".to_owned()))
    }

    /// SearchItems method
    fn search_items(
        &self,
        attributes: HashMap<String, String>,
    ) -> Result<Vec<zvariant::OwnedObjectPath>, Error> {
        let mut match_attrs = attributes;
        // Preserved bit-for-bit: filters by the collection's alias string,
        // not its object path, unlike `CreateItem`'s `xdg:collection` value.
        match_attrs.insert("xdg:collection".to_owned(), self.alias.clone());

        let found = self.store.find_items(&match_attrs)?;
        Ok(found
            .into_iter()
            .map(|path| {
                zvariant::OwnedObjectPath::try_from(path).expect("path stored in Store is valid")
            })
            .collect())
    }

    /// ItemChanged signal
    #[zbus(signal)]
    pub async fn item_changed(emitter: &SignalEmitter<'_>, item: zvariant::ObjectPath<'_>) -> zbus::Result<()>;

    /// ItemCreated signal
    #[zbus(signal)]
    async fn item_created(emitter: &SignalEmitter<'_>, item: zvariant::ObjectPath<'_>) -> zbus::Result<()>;

    /// ItemDeleted signal
    #[zbus(signal)]
    pub async fn item_deleted(emitter: &SignalEmitter<'_>, item: zvariant::ObjectPath<'_>) -> zbus::Result<()>;

    /// Created property
    #[zbus(property)]
    fn created(&self) -> u64 {
        0
    }

    /// Items property
    #[zbus(property)]
    fn items(&self) -> Result<Vec<zvariant::OwnedObjectPath>, Error> {
        let mut match_attrs = HashMap::new();
        match_attrs.insert("xdg:collection".to_owned(), self.object_path.as_str().to_owned());

        let found = self.store.find_items(&match_attrs)?;
        Ok(found
            .into_iter()
            .map(|path| {
                zvariant::OwnedObjectPath::try_from(path).expect("path stored in Store is valid")
            })
            .collect())
    }

    /// Label property
    #[zbus(property)]
    fn label(&self) -> &str {
        &self.label
    }

    #[zbus(property)]
    fn set_label(&mut self, value: String) {
        self.label = value;
    }

    /// Locked property
    #[zbus(property)]
    fn locked(&self) -> bool {
        false
    }

    /// Modified property
    #[zbus(property)]
    fn modified(&self) -> u64 {
        0
    }
}
