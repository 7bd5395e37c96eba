use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Fill ratio at which a section counts as nearly full.
pub const NEAR_THRESHOLD: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Open,
    Near,
    Full,
}

impl Status {
    /// Classify a fill ratio. Both ingestion and the dashboard export go
    /// through this.
    pub fn classify(fill: f64) -> Self {
        if fill >= 1.0 {
            Status::Full
        } else if fill >= NEAR_THRESHOLD {
            Status::Near
        } else {
            Status::Open
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Open => "OPEN",
            Status::Near => "NEAR",
            Status::Full => "FULL",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "OPEN" => Ok(Status::Open),
            "NEAR" => Ok(Status::Near),
            "FULL" => Ok(Status::Full),
            other => Err(AppError::Validation(format!("unknown status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionType {
    Lecture,
    Seminar,
    Recitation,
    Discussion,
    Lab,
    Internship,
    Project,
    IndependentStudy,
    Tutorial,
    Other,
}

impl SectionType {
    /// Derive the type from a section code by stripping digits:
    /// "10L" is a lecture, "2Lb" a lab.
    pub fn from_section_code(code: &str) -> Self {
        let letters: String = code.chars().filter(|c| !c.is_ascii_digit()).collect();
        Self::from_code(&letters)
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "L" => SectionType::Lecture,
            "S" => SectionType::Seminar,
            "R" => SectionType::Recitation,
            "D" => SectionType::Discussion,
            "B" | "Lb" => SectionType::Lab,
            "I" => SectionType::Internship,
            "P" => SectionType::Project,
            "IS" => SectionType::IndependentStudy,
            "T" => SectionType::Tutorial,
            _ => SectionType::Other,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            SectionType::Lecture => "L",
            SectionType::Seminar => "S",
            SectionType::Recitation => "R",
            SectionType::Discussion => "D",
            SectionType::Lab => "B",
            SectionType::Internship => "I",
            SectionType::Project => "P",
            SectionType::IndependentStudy => "IS",
            SectionType::Tutorial => "T",
            SectionType::Other => "O",
        }
    }

    /// Display order: lectures first, then seminar-like types, then labs.
    pub fn sort_priority(&self) -> u8 {
        match self {
            SectionType::Lecture => 0,
            SectionType::Seminar | SectionType::Discussion | SectionType::Recitation => 1,
            SectionType::Lab => 2,
            _ => 3,
        }
    }
}

/// One piece of a naturally sorted section code ("10L" -> [10, "L"]).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortPart {
    Number(u64),
    Text(String),
}

/// Sort key for sections: type priority first, then natural order of the
/// section code so "2L" sorts before "10L".
pub fn section_sort_key(code: &str, section_type: SectionType) -> (u8, Vec<SortPart>) {
    let mut parts = Vec::new();
    let mut digits = String::new();
    let mut text = String::new();

    for c in code.chars() {
        if c.is_ascii_digit() {
            if !text.is_empty() {
                parts.push(SortPart::Text(std::mem::take(&mut text)));
            }
            digits.push(c);
        } else {
            if !digits.is_empty() {
                parts.push(SortPart::Number(digits.parse().unwrap_or(0)));
                digits.clear();
            }
            text.push(c);
        }
    }
    if !digits.is_empty() {
        parts.push(SortPart::Number(digits.parse().unwrap_or(0)));
    }
    if !text.is_empty() {
        parts.push(SortPart::Text(text));
    }

    (section_type.sort_priority(), parts)
}
