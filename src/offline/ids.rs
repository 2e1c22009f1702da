use uuid::Uuid;

/// Prefix carried by every locally minted identifier
pub const LOCAL_ID_PREFIX: &str = "local_";

/// Identifier minted on this device before the remote store has assigned one
pub type LocalId = String;

/// Identifier assigned by the remote document store
pub type RemoteId = String;

/// Mints placeholder ids for entities created while offline.
///
/// Ids are `local_` followed by a v4 UUID in simple (32 hex digit) form, so
/// they never collide with each other or with store-assigned ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalIdAllocator;

impl LocalIdAllocator {
    pub fn new() -> Self {
        Self
    }

    pub fn allocate(&self) -> LocalId {
        format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4().simple())
    }
}

/// Whether `id` was produced by [`LocalIdAllocator`]
pub fn is_local_id(id: &str) -> bool {
    id.strip_prefix(LOCAL_ID_PREFIX)
        .map_or(false, |rest| rest.len() == 32 && rest.chars().all(|c| c.is_ascii_hexdigit()))
}
