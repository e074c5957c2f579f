use std::fmt;

use chrono::NaiveDateTime;

/// What triggered an event recording, per the camera firmware's code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventCause {
    Impact,
    ParkedImpact,
    Overspeed,
    Acceleration,
    Cornering,
    Braking,
    GeofenceEnter,
    GeofenceExit,
    GeofencePass,
    Drowsiness,
    Distraction,
    Yawning,
    UndetectedFace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordingType {
    Normal,
    Event(EventCause),
    Manual,
    Parking,
}

impl RecordingType {
    pub fn from_code(code: char) -> Option<Self> {
        use EventCause::*;
        let recording_type = match code {
            'N' => Self::Normal,
            'M' => Self::Manual,
            'P' => Self::Parking,
            'E' => Self::Event(Impact),
            'I' => Self::Event(ParkedImpact),
            'O' => Self::Event(Overspeed),
            'A' => Self::Event(Acceleration),
            'T' => Self::Event(Cornering),
            'B' => Self::Event(Braking),
            'R' => Self::Event(GeofenceEnter),
            'X' => Self::Event(GeofenceExit),
            'G' => Self::Event(GeofencePass),
            'D' => Self::Event(Drowsiness),
            'L' => Self::Event(Distraction),
            'Y' => Self::Event(Yawning),
            'F' => Self::Event(UndetectedFace),
            _ => return None,
        };
        Some(recording_type)
    }

    pub fn code(&self) -> char {
        use EventCause::*;
        match self {
            Self::Normal => 'N',
            Self::Manual => 'M',
            Self::Parking => 'P',
            Self::Event(Impact) => 'E',
            Self::Event(ParkedImpact) => 'I',
            Self::Event(Overspeed) => 'O',
            Self::Event(Acceleration) => 'A',
            Self::Event(Cornering) => 'T',
            Self::Event(Braking) => 'B',
            Self::Event(GeofenceEnter) => 'R',
            Self::Event(GeofenceExit) => 'X',
            Self::Event(GeofencePass) => 'G',
            Self::Event(Drowsiness) => 'D',
            Self::Event(Distraction) => 'L',
            Self::Event(Yawning) => 'Y',
            Self::Event(UndetectedFace) => 'F',
        }
    }
}

/// Camera channel the file was captured on. Sidecar files (accelerometer,
/// GPS) carry no direction code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    Front,
    Rear,
    Interior,
    Optional,
}

impl Direction {
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'F' => Some(Self::Front),
            'R' => Some(Self::Rear),
            'I' => Some(Self::Interior),
            'O' => Some(Self::Optional),
            _ => None,
        }
    }

    pub fn code(&self) -> char {
        match self {
            Self::Front => 'F',
            Self::Rear => 'R',
            Self::Interior => 'I',
            Self::Optional => 'O',
        }
    }
}

/// Marker appended by the camera when a copy of the recording was produced
/// by its own upload feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UploadFlag {
    Live,
    Substream,
}

impl UploadFlag {
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'L' => Some(Self::Live),
            'S' => Some(Self::Substream),
            _ => None,
        }
    }

    pub fn code(&self) -> char {
        match self {
            Self::Live => 'L',
            Self::Substream => 'S',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileKind {
    Video,
    Thumbnail,
    Accelerometer,
    Gps,
}

impl FileKind {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "mp4" => Some(Self::Video),
            "thm" => Some(Self::Thumbnail),
            "3gf" => Some(Self::Accelerometer),
            "gps" => Some(Self::Gps),
            _ => None,
        }
    }
}

/// Identity of one recording event, shared by every file kind that belongs
/// to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordingKey {
    pub datetime: NaiveDateTime,
    pub recording_type: RecordingType,
    pub direction: Option<Direction>,
    pub upload: Option<UploadFlag>,
}

impl fmt::Display for RecordingKey {
    /// Renders in the camera's own stem notation, e.g. `20190102_120034_NF`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            self.datetime.format("%Y%m%d_%H%M%S"),
            self.recording_type.code()
        )?;
        if let Some(direction) = self.direction {
            write!(f, "{}", direction.code())?;
        }
        if let Some(upload) = self.upload {
            write!(f, "{}", upload.code())?;
        }
        Ok(())
    }
}

/// One recording file, parsed from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub filename: String,
    pub datetime: NaiveDateTime,
    pub recording_type: RecordingType,
    pub direction: Option<Direction>,
    pub upload: Option<UploadFlag>,
    pub kind: FileKind,
}

impl Recording {
    pub fn key(&self) -> RecordingKey {
        RecordingKey {
            datetime: self.datetime,
            recording_type: self.recording_type,
            direction: self.direction,
            upload: self.upload,
        }
    }

    /// Normal and manual recordings are the ones a scheduler-driven run
    /// reports on; everything else is only worth noise at higher verbosity.
    pub fn is_routine(&self) -> bool {
        matches!(
            self.recording_type,
            RecordingType::Normal | RecordingType::Manual
        )
    }
}

/// Parse a recording filename of the form
/// `YYYYMMDD_HHMMSS_<type>[<direction>][<upload>].<ext>`.
///
/// Returns `None` for anything malformed or carrying an unknown code;
/// callers log and skip rather than abort.
pub fn parse(filename: &str) -> Option<Recording> {
    let (stem, extension) = filename.rsplit_once('.')?;
    let kind = FileKind::from_extension(extension)?;

    // fixed-width prefix: 8 date digits, '_', 6 time digits, '_'
    let bytes = stem.as_bytes();
    if bytes.len() < 17 || bytes[8] != b'_' || bytes[15] != b'_' {
        return None;
    }
    let base = &stem[..15];
    let datetime = NaiveDateTime::parse_from_str(base, "%Y%m%d_%H%M%S").ok()?;

    let mut codes = stem[16..].chars();
    let recording_type = RecordingType::from_code(codes.next()?)?;

    let mut direction = None;
    let mut upload = None;
    let mut next = codes.next();
    if let Some(c) = next {
        if let Some(d) = Direction::from_code(c) {
            direction = Some(d);
            next = codes.next();
        }
    }
    if let Some(c) = next {
        upload = Some(UploadFlag::from_code(c)?);
        next = codes.next();
    }
    if next.is_some() {
        return None;
    }

    Some(Recording {
        filename: filename.to_string(),
        datetime,
        recording_type,
        direction,
        upload,
        kind,
    })
}

/// In-progress downloads hide behind a dot prefix until they are complete.
pub fn temp_name(filename: &str) -> String {
    format!(".{filename}")
}

/// Recognize a temporary file and recover the recording it will become.
pub fn parse_temp(name: &str) -> Option<Recording> {
    name.strip_prefix('.').and_then(parse)
}
