//! Share metadata: a thin dual-indexed record pointing at the exporting host.

use super::{Item, Store, BY_ID_FOLDER, BY_NAME_FOLDER, SHARES_FOLDER};
use crate::error::{Result, StratusError};
use crate::model::Share;
use tokio::sync::OwnedMutexGuard;

pub struct ShareMetadata {
    item: Item<Share>,
}

impl ShareMetadata {
    pub fn new(store: &Store) -> Self {
        Self { item: Item::new(store, SHARES_FOLDER) }
    }

    pub fn carry(mut self, share: Share) -> Self {
        self.item.carry(share);
        self
    }

    pub fn share(&self) -> &Share {
        self.item.payload().expect("no share carried")
    }

    pub fn take(&mut self) -> Option<Share> {
        self.item.take()
    }

    pub async fn write(&self) -> Result<()> {
        let (id, name) = {
            let share = self.share();
            (share.id.clone(), share.name.clone())
        };
        if id.is_empty() || name.is_empty() {
            return Err(StratusError::logic("share metadata needs both id and name"));
        }
        self.item.write(BY_ID_FOLDER, &id).await?;
        self.item.write(BY_NAME_FOLDER, &name).await
    }

    pub async fn read_by_id(&mut self, id: &str) -> Result<bool> {
        self.item.read(BY_ID_FOLDER, id).await
    }

    pub async fn read_by_name(&mut self, name: &str) -> Result<bool> {
        self.item.read(BY_NAME_FOLDER, name).await
    }

    pub async fn delete(&self) -> Result<()> {
        let share = self.share();
        self.item.delete(BY_ID_FOLDER, &share.id).await?;
        self.item.delete(BY_NAME_FOLDER, &share.name).await
    }

    pub async fn browse(&self) -> Result<Vec<Share>> {
        self.item.browse().await
    }

    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        self.item.acquire(&self.share().id).await
    }
}

/// Load a share by id, falling back to name.
pub async fn load_share(store: &Store, reference: &str) -> Result<Option<Share>> {
    let mut metadata = ShareMetadata::new(store);
    if metadata.read_by_id(reference).await? {
        return Ok(metadata.take());
    }
    if metadata.read_by_name(reference).await? {
        return Ok(metadata.take());
    }
    Ok(None)
}

pub async fn save_share(store: &Store, share: &Share) -> Result<()> {
    ShareMetadata::new(store).carry(share.clone()).write().await
}

pub async fn remove_share(store: &Store, share: &Share) -> Result<()> {
    ShareMetadata::new(store).carry(share.clone()).delete().await
}
