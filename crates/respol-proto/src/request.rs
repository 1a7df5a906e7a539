//! Outbound messages: registration and arbitration requests.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::{errors::ProtocolError, kind::ResourceKinds};

/// Identifier the manager assigns to a resource set on first connection.
///
/// Zero means "not yet assigned".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceSetId(pub u32);

impl ResourceSetId {
    /// Placeholder before the manager assigned an identifier.
    pub const UNSET: Self = Self(0);

    /// Whether the manager has assigned this identifier.
    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ResourceSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Arbitration request sent by a resource set.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
pub enum RequestKind {
    /// Ask for the resources in the set
    Acquire = 1,
    /// Tell the manager the set's membership changed
    Update = 2,
    /// Give up any held resources
    Release = 3,
}

impl RequestKind {
    /// Short lowercase name, used as a log field.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Update => "update",
            Self::Release => "release",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for RequestKind {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Acquire),
            2 => Ok(Self::Update),
            3 => Ok(Self::Release),
            other => Err(ProtocolError::UnknownRequestKind(other)),
        }
    }
}

/// Stream tag used by the audio policy to match a playback stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamTag {
    /// Property name (e.g. `media.name`)
    pub name: String,
    /// Property value
    pub value: String,
}

/// Audio routing properties negotiated with the manager.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioProperties {
    /// Audio group (e.g. `player`, `ringtone`, `fmradio`)
    pub group: String,
    /// Process that owns the audio stream
    pub pid: Option<u32>,
    /// Stream tag matched by the audio policy
    pub stream_tag: Option<StreamTag>,
}

/// What a resource set currently asks for.
///
/// `optional` is always a subset of `all`; kinds in `all` but not in
/// `optional` are mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Every kind in the set
    pub all: ResourceKinds,
    /// Kinds the set can live without
    pub optional: ResourceKinds,
    /// Audio properties, if the set holds an audio playback resource
    pub audio: Option<AudioProperties>,
    /// Owning process of the video stream, if any
    pub video_pid: Option<u32>,
}

impl ResourceDescriptor {
    /// Kinds that must all be granted.
    pub fn mandatory(&self) -> ResourceKinds {
        self.all.difference(self.optional)
    }
}

/// Sent by the transport when it (re)connects a resource set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Identifier from a previous connection, `None` on first contact
    pub identifier: Option<ResourceSetId>,
    /// Application class, drives the manager's priority decision
    pub application_class: String,
    /// Preemption releases the set instead of queuing it for re-grant
    pub auto_release: bool,
    /// Reply to requests even when the grant is unchanged
    pub always_reply: bool,
    /// Current membership of the set
    pub descriptor: ResourceDescriptor,
}

/// One arbitration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Set the request belongs to
    pub identifier: ResourceSetId,
    /// What is asked
    pub kind: RequestKind,
    /// Membership at the time of the request
    pub descriptor: ResourceDescriptor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mandatory_excludes_optional() {
        let descriptor = ResourceDescriptor {
            all: ResourceKinds::AUDIO_PLAYBACK | ResourceKinds::VIDEO_PLAYBACK,
            optional: ResourceKinds::VIDEO_PLAYBACK,
            ..Default::default()
        };
        assert_eq!(descriptor.mandatory(), ResourceKinds::AUDIO_PLAYBACK);
    }

    #[test]
    fn request_kind_codes() {
        for kind in [RequestKind::Acquire, RequestKind::Update, RequestKind::Release] {
            assert_eq!(RequestKind::try_from(kind as u8), Ok(kind));
        }
        assert_eq!(RequestKind::try_from(0), Err(ProtocolError::UnknownRequestKind(0)));
    }

    #[test]
    fn unset_identifier() {
        assert!(!ResourceSetId::UNSET.is_assigned());
        assert!(ResourceSetId(7).is_assigned());
    }
}
