use std::fmt;
use std::str::FromStr;

/// Page value that marks a song play in the event log.
pub const PLAY_PAGE: &str = "NextSong";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// One song of the reference catalog, together with its artist.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRecord {
    pub song_id: String,
    pub artist_id: String,
    pub title: String,
    pub artist_name: String,
    pub artist_location: Option<String>,
    pub artist_coordinates: Option<GeoPoint>,
    pub duration: f64,
    /// 0 when unknown.
    pub year: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Gender {
    Female,
    Male,
    Unknown,
}

impl Gender {
    pub fn from_code(code: Option<&str>) -> Self {
        match code.map(str::trim) {
            Some("F") | Some("f") => Gender::Female,
            Some("M") | Some("m") => Gender::Male,
            _ => Gender::Unknown,
        }
    }

    pub fn as_code(&self) -> Option<&'static str> {
        match self {
            Gender::Female => Some("F"),
            Gender::Male => Some("M"),
            Gender::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Free,
    Paid,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Free => "free",
            Level::Paid => "paid",
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Level::Free),
            "paid" => Ok(Level::Paid),
            other => Err(format!("unknown subscription level '{}'", other)),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user did. Only [`Action::Play`] produces fact rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Play,
    Other(String),
}

impl Action {
    pub fn from_page(page: &str) -> Self {
        if page == PLAY_PAGE {
            Action::Play
        } else {
            Action::Other(page.to_string())
        }
    }

    pub fn is_fact_eligible(&self) -> bool {
        matches!(self, Action::Play)
    }
}

/// One entry of the listening-session log.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Epoch milliseconds.
    pub ts: i64,
    pub user_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Gender,
    pub level: Option<Level>,
    pub session_id: i64,
    pub item_in_session: Option<i64>,
    pub action: Action,
    pub song: Option<String>,
    pub artist: Option<String>,
    pub length: Option<f64>,
    pub user_agent: Option<String>,
    pub location: Option<String>,
}

/// Closed set of typed rows the parser can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRecord {
    Catalog(CatalogRecord),
    Event(EventRecord),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!("free".parse::<Level>().unwrap(), Level::Free);
        assert_eq!(" PAID ".parse::<Level>().unwrap(), Level::Paid);
        assert!("gold".parse::<Level>().is_err());
    }

    #[test]
    fn test_gender_codes() {
        assert_eq!(Gender::from_code(Some("F")), Gender::Female);
        assert_eq!(Gender::from_code(Some("M")), Gender::Male);
        assert_eq!(Gender::from_code(Some("X")), Gender::Unknown);
        assert_eq!(Gender::from_code(None), Gender::Unknown);
        assert_eq!(Gender::Unknown.as_code(), None);
    }

    #[test]
    fn test_only_next_song_is_fact_eligible() {
        assert!(Action::from_page("NextSong").is_fact_eligible());
        assert!(!Action::from_page("Home").is_fact_eligible());
        assert!(!Action::from_page("nextsong").is_fact_eligible());
    }
}
