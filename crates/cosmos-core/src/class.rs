//! Region class taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Semantic class of a page region
///
/// The declaration order doubles as a stable ordinal used for deterministic
/// tie-breaking; it is NOT the resolution priority (see `ResolutionConfig::class_priority`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionClass {
    BodyText,
    SectionHeader,
    Caption,
    FigureCaption,
    TableCaption,
    Table,
    Figure,
    Equation,
    PageHeader,
    PageFooter,
}

impl RegionClass {
    pub const ALL: [Self; 10] = [
        Self::BodyText,
        Self::SectionHeader,
        Self::Caption,
        Self::FigureCaption,
        Self::TableCaption,
        Self::Table,
        Self::Figure,
        Self::Equation,
        Self::PageHeader,
        Self::PageFooter,
    ];

    /// Human-readable label, as used by the ingestion index
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BodyText => "Body Text",
            Self::SectionHeader => "Section Header",
            Self::Caption => "Caption",
            Self::FigureCaption => "Figure Caption",
            Self::TableCaption => "Table Caption",
            Self::Table => "Table",
            Self::Figure => "Figure",
            Self::Equation => "Equation",
            Self::PageHeader => "Page Header",
            Self::PageFooter => "Page Footer",
        }
    }

    /// Classes whose payload is recognized text
    #[inline]
    #[must_use]
    pub const fn is_text_bearing(&self) -> bool {
        matches!(
            self,
            Self::BodyText
                | Self::SectionHeader
                | Self::Caption
                | Self::FigureCaption
                | Self::TableCaption
                | Self::PageHeader
                | Self::PageFooter
        )
    }

    /// Structured classes take precedence over text inside their bounds
    #[inline]
    #[must_use]
    pub const fn is_structured(&self) -> bool {
        matches!(self, Self::Table | Self::Figure | Self::Equation)
    }

    #[inline]
    #[must_use]
    pub const fn is_caption(&self) -> bool {
        matches!(self, Self::Caption | Self::FigureCaption | Self::TableCaption)
    }

    /// Page furniture that is read outside the body flow
    #[inline]
    #[must_use]
    pub const fn is_page_furniture(&self) -> bool {
        matches!(self, Self::PageHeader | Self::PageFooter)
    }

    /// Whether a caption of this class may describe a region of class `target`
    #[must_use]
    pub const fn captions(&self, target: Self) -> bool {
        match self {
            Self::FigureCaption => matches!(target, Self::Figure),
            Self::TableCaption => matches!(target, Self::Table),
            Self::Caption => matches!(target, Self::Figure | Self::Table),
            _ => false,
        }
    }

    /// Normalize a detector label: lowercase and replace hyphens/spaces with underscores
    fn normalize_label(label: &str) -> String {
        label.trim().to_lowercase().replace(['-', ' '], "_")
    }
}

impl fmt::Display for RegionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a detector label has no class in the taxonomy
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown region label: {0}")]
pub struct UnknownLabel(pub String);

impl FromStr for RegionClass {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let class = match Self::normalize_label(s).as_str() {
            "body_text" | "text" | "paragraph" | "body" => Self::BodyText,
            "section_header" | "section_heading" | "title" => Self::SectionHeader,
            "caption" => Self::Caption,
            "figure_caption" => Self::FigureCaption,
            "table_caption" => Self::TableCaption,
            "table" => Self::Table,
            "figure" | "picture" => Self::Figure,
            "equation" | "formula" => Self::Equation,
            "page_header" => Self::PageHeader,
            "page_footer" => Self::PageFooter,
            _ => return Err(UnknownLabel(s.to_string())),
        };
        Ok(class)
    }
}
