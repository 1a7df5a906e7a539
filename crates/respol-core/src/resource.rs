//! Resource value types.
//!
//! A [`Resource`] describes one capability a set asks for. Most kinds only
//! carry the mandatory/optional flag; audio and video playback also carry
//! routing properties the manager uses when it sets up the path.
//!
//! Handing a resource to a set moves it. The set owns it from then on and
//! drops it when it is replaced or deleted.

use respol_proto::{AudioProperties, ResourceKind, StreamTag};

/// Any resource other than audio or video playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericResource {
    kind: ResourceKind,
    optional: bool,
}

impl GenericResource {
    /// Mandatory resource of the given kind.
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind, optional: false }
    }

    /// Kind of this resource.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

/// Audio playback with the properties the audio policy routes on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioResource {
    optional: bool,
    properties: AudioProperties,
}

impl AudioResource {
    /// Mandatory audio playback in the given audio group.
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            optional: false,
            properties: AudioProperties { group: group.into(), ..Default::default() },
        }
    }

    /// Audio group name.
    pub fn group(&self) -> &str {
        &self.properties.group
    }

    /// Change the audio group.
    pub fn set_group(&mut self, group: impl Into<String>) {
        self.properties.group = group.into();
    }

    /// Process owning the audio stream.
    pub fn process_id(&self) -> Option<u32> {
        self.properties.pid
    }

    /// Set the process owning the audio stream.
    pub fn set_process_id(&mut self, pid: u32) {
        self.properties.pid = Some(pid);
    }

    /// Stream tag matched by the audio policy.
    pub fn stream_tag(&self) -> Option<&StreamTag> {
        self.properties.stream_tag.as_ref()
    }

    /// Set the stream tag matched by the audio policy.
    pub fn set_stream_tag(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.stream_tag = Some(StreamTag { name: name.into(), value: value.into() });
    }

    /// All properties as sent to the manager.
    pub fn properties(&self) -> &AudioProperties {
        &self.properties
    }
}

/// Video playback, optionally tied to the process rendering it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VideoResource {
    optional: bool,
    pid: Option<u32>,
}

impl VideoResource {
    /// Mandatory video playback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process rendering the video.
    pub fn process_id(&self) -> Option<u32> {
        self.pid
    }

    /// Set the process rendering the video.
    pub fn set_process_id(&mut self, pid: u32) {
        self.pid = Some(pid);
    }
}

/// A requested capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// Kind without extra properties
    Generic(GenericResource),
    /// Audio playback
    Audio(AudioResource),
    /// Video playback
    Video(VideoResource),
}

impl Resource {
    /// Default mandatory resource for `kind`.
    ///
    /// Audio and video playback get their rich type with empty properties.
    pub fn new(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::AudioPlayback => Self::Audio(AudioResource::default()),
            ResourceKind::VideoPlayback => Self::Video(VideoResource::new()),
            other => Self::Generic(GenericResource::new(other)),
        }
    }

    /// Kind this resource claims.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Generic(resource) => resource.kind,
            Self::Audio(_) => ResourceKind::AudioPlayback,
            Self::Video(_) => ResourceKind::VideoPlayback,
        }
    }

    /// Whether the set can be granted without this resource.
    pub fn is_optional(&self) -> bool {
        match self {
            Self::Generic(resource) => resource.optional,
            Self::Audio(resource) => resource.optional,
            Self::Video(resource) => resource.optional,
        }
    }

    /// Whether this resource must be granted for the set to be granted.
    pub fn is_mandatory(&self) -> bool {
        !self.is_optional()
    }

    /// Mark the resource optional or mandatory.
    pub fn set_optional(&mut self, optional: bool) {
        match self {
            Self::Generic(resource) => resource.optional = optional,
            Self::Audio(resource) => resource.optional = optional,
            Self::Video(resource) => resource.optional = optional,
        }
    }

    /// Builder form of [`Resource::set_optional`].
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.set_optional(true);
        self
    }

    /// Audio properties, if this is audio playback.
    pub fn as_audio(&self) -> Option<&AudioResource> {
        match self {
            Self::Audio(audio) => Some(audio),
            _ => None,
        }
    }

    /// Mutable audio properties, if this is audio playback.
    pub fn as_audio_mut(&mut self) -> Option<&mut AudioResource> {
        match self {
            Self::Audio(audio) => Some(audio),
            _ => None,
        }
    }

    /// Video properties, if this is video playback.
    pub fn as_video(&self) -> Option<&VideoResource> {
        match self {
            Self::Video(video) => Some(video),
            _ => None,
        }
    }

    /// Mutable video properties, if this is video playback.
    pub fn as_video_mut(&mut self) -> Option<&mut VideoResource> {
        match self {
            Self::Video(video) => Some(video),
            _ => None,
        }
    }
}

impl From<ResourceKind> for Resource {
    fn from(kind: ResourceKind) -> Self {
        Self::new(kind)
    }
}

impl From<GenericResource> for Resource {
    fn from(resource: GenericResource) -> Self {
        Self::Generic(resource)
    }
}

impl From<AudioResource> for Resource {
    fn from(resource: AudioResource) -> Self {
        Self::Audio(resource)
    }
}

impl From<VideoResource> for Resource {
    fn from(resource: VideoResource) -> Self {
        Self::Video(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_picks_rich_types_for_playback() {
        assert!(Resource::new(ResourceKind::AudioPlayback).as_audio().is_some());
        assert!(Resource::new(ResourceKind::VideoPlayback).as_video().is_some());
        assert!(matches!(Resource::new(ResourceKind::Vibra), Resource::Generic(_)));
    }

    #[test]
    fn resources_are_mandatory_by_default() {
        for kind in ResourceKind::ALL {
            let resource = Resource::new(kind);
            assert_eq!(resource.kind(), kind);
            assert!(resource.is_mandatory());
        }
    }

    #[test]
    fn optional_flag_toggles() {
        let mut resource = Resource::from(AudioResource::new("player")).optional();
        assert!(resource.is_optional());

        resource.set_optional(false);
        assert!(resource.is_mandatory());
    }

    #[test]
    fn audio_properties_are_editable() {
        let mut audio = AudioResource::new("fmradio");
        audio.set_process_id(321);
        audio.set_stream_tag("media.name", "radio");

        assert_eq!(audio.group(), "fmradio");
        assert_eq!(audio.process_id(), Some(321));
        assert_eq!(audio.stream_tag().map(|t| t.value.as_str()), Some("radio"));

        audio.set_group("player");
        assert_eq!(audio.properties().group, "player");
    }
}
