use super::engine::Engine;
use super::errors::{EngineError, EngineResult};
use tracing::{debug, trace};

/// Stream types that can be selected independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Subtitle,
}

impl TrackKind {
    /// Value of `track-list/{i}/type` for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Subtitle => "sub",
        }
    }

    /// Property holding the selected track id
    pub fn selector(&self) -> &'static str {
        match self {
            TrackKind::Audio => "aid",
            TrackKind::Subtitle => "sid",
        }
    }

    pub fn from_type(value: &str) -> Option<Self> {
        match value {
            "audio" => Some(TrackKind::Audio),
            "sub" => Some(TrackKind::Subtitle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    /// Engine-assigned, unique per kind within the loaded file
    pub id: i64,
    pub kind: TrackKind,
    pub language: Option<String>,
    pub title: Option<String>,
    pub codec: Option<String>,
    pub is_default: bool,
    pub is_forced: bool,
}

/// Reader for an indexed property namespace: `<prefix>/count` plus
/// `<prefix>/{i}/<field>` for every record.
///
/// Required fields propagate their errors. Optional ones read as `None`
/// whatever the engine answered.
pub struct IndexedList<'a> {
    engine: &'a Engine,
    prefix: &'a str,
}

impl<'a> IndexedList<'a> {
    pub fn new(engine: &'a Engine, prefix: &'a str) -> Self {
        Self { engine, prefix }
    }

    pub fn len(&self) -> EngineResult<usize> {
        let count = self.engine.get_i64(&format!("{}/count", self.prefix))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self) -> EngineResult<bool> {
        Ok(self.len()? == 0)
    }

    fn field(&self, index: usize, field: &str) -> String {
        format!("{}/{}/{}", self.prefix, index, field)
    }

    pub fn string(&self, index: usize, field: &str) -> EngineResult<String> {
        self.engine.get_string(&self.field(index, field))
    }

    pub fn integer(&self, index: usize, field: &str) -> EngineResult<i64> {
        self.engine.get_i64(&self.field(index, field))
    }

    pub fn optional_string(&self, index: usize, field: &str) -> Option<String> {
        self.string(index, field)
            .inspect_err(|e| trace!("{} unavailable: {}", self.field(index, field), e))
            .ok()
    }

    pub fn optional_flag(&self, index: usize, field: &str) -> Option<bool> {
        self.engine.get_flag(&self.field(index, field)).ok()
    }
}

impl Engine {
    fn track_list(&self) -> IndexedList<'_> {
        IndexedList::new(self, "track-list")
    }

    /// Indices into `track-list` whose type matches `kind`
    fn track_indices(&self, kind: TrackKind) -> EngineResult<Vec<usize>> {
        let list = self.track_list();
        let mut indices = Vec::new();
        for index in 0..list.len()? {
            if list.string(index, "type")? == kind.as_str() {
                indices.push(index);
            }
        }
        Ok(indices)
    }

    /// Enumerate the tracks of `kind` in the loaded file. Empty before a
    /// file is loaded.
    pub fn tracks(&self, kind: TrackKind) -> EngineResult<Vec<TrackInfo>> {
        let list = self.track_list();
        let tracks = self
            .track_indices(kind)?
            .into_iter()
            .map(|index| {
                Ok(TrackInfo {
                    id: list.integer(index, "id")?,
                    kind,
                    language: list.optional_string(index, "lang"),
                    title: list.optional_string(index, "title"),
                    codec: list.optional_string(index, "codec"),
                    is_default: list.optional_flag(index, "default").unwrap_or(false),
                    is_forced: list.optional_flag(index, "forced").unwrap_or(false),
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        debug!("Found {} {} tracks", tracks.len(), kind.as_str());
        Ok(tracks)
    }

    /// Selected track id of `kind`, `0` when none is selected.
    pub fn current_track(&self, kind: TrackKind) -> EngineResult<i64> {
        let value = self.get_string(kind.selector())?;
        Ok(parse_track_id(&value))
    }

    pub fn current_audio_track(&self) -> EngineResult<i64> {
        self.current_track(TrackKind::Audio)
    }

    pub fn current_subtitle_track(&self) -> EngineResult<i64> {
        self.current_track(TrackKind::Subtitle)
    }

    /// Language of track `id`. `None` if there is no such track or the
    /// track carries no language.
    pub fn track_language(&self, id: i64, kind: TrackKind) -> EngineResult<Option<String>> {
        let list = self.track_list();
        for index in self.track_indices(kind)? {
            match list.integer(index, "id") {
                Ok(found) if found == id => return Ok(list.optional_string(index, "lang")),
                Ok(_) => {}
                Err(EngineError::Disposed) => return Err(EngineError::Disposed),
                Err(e) => trace!("Skipping track {}: {}", index, e),
            }
        }
        Ok(None)
    }
}

fn parse_track_id(value: &str) -> i64 {
    match value {
        "no" | "auto" => 0,
        other => other.parse().unwrap_or(0),
    }
}
