// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bitflags::bitflags;
use bytes::{Bytes, BytesMut};
use once_cell::sync::Lazy;

use crate::{
    errors::Result,
    proto::codec::{
        DeserializeRecord, SerializeRecord, get_int, get_long, get_string, put_int,
        put_long, put_string,
    },
};

bitflags! {
    /// Permission bits carried by an [`Acl`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Perms: i32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const CREATE = 1 << 2;
        const DELETE = 1 << 3;
        const ADMIN = 1 << 4;
        const ALL = Self::READ.bits()
            | Self::WRITE.bits()
            | Self::CREATE.bits()
            | Self::DELETE.bits()
            | Self::ADMIN.bits();
    }
}

/// Identity an ACL entry applies to (auth scheme + scheme-specific id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Id {
    pub scheme: String,
    pub id: String,
}

impl Id {
    pub fn new(scheme: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            id: id.into(),
        }
    }
}

impl SerializeRecord for Id {
    fn serialize(&self, buf: &mut BytesMut) {
        put_string(buf, &self.scheme);
        put_string(buf, &self.id);
    }
}

impl DeserializeRecord for Id {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            scheme: get_string(data)?,
            id: get_string(data)?,
        })
    }
}

/// One access-control entry of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    pub perms: Perms,
    pub id: Id,
}

impl SerializeRecord for Acl {
    fn serialize(&self, buf: &mut BytesMut) {
        put_int(buf, self.perms.bits());
        self.id.serialize(buf);
    }
}

impl DeserializeRecord for Acl {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            perms: Perms::from_bits_retain(get_int(data)?),
            id: Id::deserialize(data)?,
        })
    }
}

/// World-readable anyone identity.
pub static ANYONE_ID_UNSAFE: Lazy<Id> = Lazy::new(|| Id::new("world", "anyone"));

/// Identity of the session's own auth credentials.
pub static AUTH_IDS: Lazy<Id> = Lazy::new(|| Id::new("auth", ""));

/// Fully open ACL; the default for created nodes unless configured otherwise.
pub static OPEN_ACL_UNSAFE: Lazy<Acl> = Lazy::new(|| Acl {
    perms: Perms::ALL,
    id: ANYONE_ID_UNSAFE.clone(),
});

/// All permissions for the creator's auth identity.
pub static CREATOR_ALL_ACL: Lazy<Acl> = Lazy::new(|| Acl {
    perms: Perms::ALL,
    id: AUTH_IDS.clone(),
});

/// World-readable, otherwise closed.
pub static READ_ACL_UNSAFE: Lazy<Acl> = Lazy::new(|| Acl {
    perms: Perms::READ,
    id: ANYONE_ID_UNSAFE.clone(),
});

/// Node creation mode (`flags` field of a create request).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    Persistent,
    Ephemeral,
    PersistentSequential,
    EphemeralSequential,
}

impl CreateMode {
    pub fn from_flags(ephemeral: bool, sequential: bool) -> Self {
        match (ephemeral, sequential) {
            (false, false) => CreateMode::Persistent,
            (true, false) => CreateMode::Ephemeral,
            (false, true) => CreateMode::PersistentSequential,
            (true, true) => CreateMode::EphemeralSequential,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            CreateMode::Persistent => 0,
            CreateMode::Ephemeral => 1,
            CreateMode::PersistentSequential => 2,
            CreateMode::EphemeralSequential => 3,
        }
    }
}

/// Node metadata echoed by the server on most read and write replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    pub czxid: i64,
    pub mzxid: i64,
    pub ctime: i64,
    pub mtime: i64,
    pub version: i32,
    pub cversion: i32,
    pub aversion: i32,
    pub ephemeral_owner: i64,
    pub data_length: i32,
    pub num_children: i32,
    pub pzxid: i64,
}

impl SerializeRecord for Stat {
    fn serialize(&self, buf: &mut BytesMut) {
        put_long(buf, self.czxid);
        put_long(buf, self.mzxid);
        put_long(buf, self.ctime);
        put_long(buf, self.mtime);
        put_int(buf, self.version);
        put_int(buf, self.cversion);
        put_int(buf, self.aversion);
        put_long(buf, self.ephemeral_owner);
        put_int(buf, self.data_length);
        put_int(buf, self.num_children);
        put_long(buf, self.pzxid);
    }
}

impl DeserializeRecord for Stat {
    fn deserialize(data: &mut Bytes) -> Result<Self> {
        Ok(Self {
            czxid: get_long(data)?,
            mzxid: get_long(data)?,
            ctime: get_long(data)?,
            mtime: get_long(data)?,
            version: get_int(data)?,
            cversion: get_int(data)?,
            aversion: get_int(data)?,
            ephemeral_owner: get_long(data)?,
            data_length: get_int(data)?,
            num_children: get_int(data)?,
            pzxid: get_long(data)?,
        })
    }
}
