//! Composite Import Key parsing and formatting.
//!
//! An Import Key is a `:`-delimited string of positional segments, fixed per
//! entity kind. Trailing segments may be optional; an empty optional segment
//! means "not supplied", so `123::secret` skips an optional middle segment.

use crate::error::InputError;

use super::state::DeclaredState;

/// Segment delimiter.
pub const DELIMITER: char = ':';

/// Segment name that maps to the entity identifier.
pub const ID_SEGMENT: &str = "id";

/// One positional segment of an Import Key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSegment {
    /// Declared-state field the segment populates.
    pub field: &'static str,
    /// Whether the segment may be left out.
    pub optional: bool,
    /// Whether the segment takes the rest of the key, delimiters included.
    pub rest: bool,
}

impl ImportSegment {
    /// A mandatory segment.
    #[must_use]
    pub const fn required(field: &'static str) -> Self {
        Self {
            field,
            optional: false,
            rest: false,
        }
    }

    /// A segment that may be left out.
    #[must_use]
    pub const fn optional(field: &'static str) -> Self {
        Self {
            field,
            optional: true,
            rest: false,
        }
    }

    /// An optional last segment whose value may itself contain the delimiter.
    #[must_use]
    pub const fn trailing(field: &'static str) -> Self {
        Self {
            field,
            optional: true,
            rest: true,
        }
    }
}

/// Positional layout of an entity kind's Import Key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportFormat {
    segments: &'static [ImportSegment],
}

/// A parsed Import Key: field values in segment order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportKey {
    values: Vec<(&'static str, String)>,
}

impl ImportFormat {
    /// Creates a format; optional segments must come last and only the last
    /// segment may be [`ImportSegment::trailing`].
    #[must_use]
    pub const fn new(segments: &'static [ImportSegment]) -> Self {
        Self { segments }
    }

    /// The segments in positional order.
    #[must_use]
    pub const fn segments(&self) -> &'static [ImportSegment] {
        self.segments
    }

    fn required_count(&self) -> usize {
        self.segments.iter().filter(|s| !s.optional).count()
    }

    /// Human-readable format, e.g. `<project_id:user_id[:org_id]>`.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = String::from("<");
        for (i, segment) in self.segments.iter().enumerate() {
            match (i, segment.optional) {
                (0, false) => out.push_str(segment.field),
                (_, false) => {
                    out.push(DELIMITER);
                    out.push_str(segment.field);
                }
                (_, true) => {
                    out.push('[');
                    if i > 0 {
                        out.push(DELIMITER);
                    }
                    out.push_str(segment.field);
                    out.push(']');
                }
            }
        }
        out.push('>');
        out
    }

    /// Parses a key into its positional fields.
    ///
    /// # Errors
    ///
    /// Returns an input error if the segment count is outside the accepted
    /// range or a mandatory segment is empty.
    pub fn parse(&self, key: &str) -> Result<ImportKey, InputError> {
        let parts: Vec<&str> = if self.segments.last().is_some_and(|s| s.rest) {
            key.splitn(self.segments.len(), DELIMITER).collect()
        } else {
            key.split(DELIMITER).collect()
        };

        if parts.len() < self.required_count() || parts.len() > self.segments.len() {
            return Err(InputError::ImportKeyArity {
                key: key.to_string(),
                format: self.describe(),
                found: parts.len(),
            });
        }

        let mut values = Vec::with_capacity(parts.len());
        for (segment, part) in self.segments.iter().zip(parts) {
            if part.is_empty() {
                if segment.optional {
                    continue;
                }
                return Err(InputError::EmptyImportSegment {
                    key: key.to_string(),
                    field: segment.field.to_string(),
                });
            }
            values.push((segment.field, part.to_string()));
        }

        Ok(ImportKey { values })
    }

    /// Builds the key for an existing entity from its declared state.
    ///
    /// Trailing optional segments without a value are dropped; an absent
    /// optional segment followed by a present one is left empty.
    #[must_use]
    pub fn format(&self, state: &DeclaredState) -> String {
        let mut parts: Vec<String> = self
            .segments
            .iter()
            .map(|segment| {
                if segment.field == ID_SEGMENT {
                    state.id().to_string()
                } else {
                    state
                        .get(segment.field)
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string()
                }
            })
            .collect();

        while parts.len() > self.required_count() && parts.last().is_some_and(String::is_empty) {
            parts.pop();
        }

        parts.join(&DELIMITER.to_string())
    }
}

impl ImportKey {
    /// Value of one segment, if supplied.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value.as_str())
    }

    /// Declared state holding only the identifying fields from the key.
    #[must_use]
    pub fn seed(&self) -> DeclaredState {
        let mut state = DeclaredState::new();
        for (field, value) in &self.values {
            if *field == ID_SEGMENT {
                state.set_id(value.clone());
            } else {
                state.set(field, value.clone());
            }
        }
        state
    }
}
