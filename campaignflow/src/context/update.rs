//! Partial context updates returned by stages.

use super::{GeneratedImage, Instructions};
use crate::core::RunStatus;
use crate::errors::DataConflictError;
use std::fmt;

/// A context field a stage may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextField {
    /// Planning instructions.
    Instructions,
    /// Text branch output.
    TextOutput,
    /// Image bytes awaiting publish.
    GeneratedImage,
    /// Image branch output.
    ImageOutput,
    /// Video branch output.
    VideoOutput,
    /// Linked generated-output record.
    GeneratedOutputId,
    /// Run status.
    Status,
}

impl fmt::Display for ContextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Instructions => "instructions",
            Self::TextOutput => "text_output",
            Self::GeneratedImage => "generated_image",
            Self::ImageOutput => "image_output",
            Self::VideoOutput => "video_output",
            Self::GeneratedOutputId => "generated_output_id",
            Self::Status => "status",
        };
        f.write_str(name)
    }
}

/// A single field assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Replace the instructions.
    Instructions(Instructions),
    /// Set the text output.
    TextOutput(Option<String>),
    /// Set the pending image bytes.
    GeneratedImage(Option<GeneratedImage>),
    /// Set the image output reference.
    ImageOutput(Option<String>),
    /// Set the video output URL.
    VideoOutput(Option<String>),
    /// Set the generated-output record id.
    GeneratedOutputId(Option<String>),
    /// Advance the run status.
    Status(RunStatus),
}

impl FieldUpdate {
    /// Returns the field this update writes.
    #[must_use]
    pub fn field(&self) -> ContextField {
        match self {
            Self::Instructions(_) => ContextField::Instructions,
            Self::TextOutput(_) => ContextField::TextOutput,
            Self::GeneratedImage(_) => ContextField::GeneratedImage,
            Self::ImageOutput(_) => ContextField::ImageOutput,
            Self::VideoOutput(_) => ContextField::VideoOutput,
            Self::GeneratedOutputId(_) => ContextField::GeneratedOutputId,
            Self::Status(_) => ContextField::Status,
        }
    }
}

/// The set of fields a stage wants merged into the run context.
///
/// Each field appears at most once; setting a field twice keeps the last
/// value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextUpdate {
    fields: Vec<FieldUpdate>,
}

impl ContextUpdate {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing any earlier value for it.
    pub fn set(&mut self, update: FieldUpdate) {
        let field = update.field();
        self.fields.retain(|existing| existing.field() != field);
        self.fields.push(update);
    }

    fn with(mut self, update: FieldUpdate) -> Self {
        self.set(update);
        self
    }

    /// Sets the planning instructions.
    #[must_use]
    pub fn with_instructions(self, instructions: Instructions) -> Self {
        self.with(FieldUpdate::Instructions(instructions))
    }

    /// Sets the text output.
    #[must_use]
    pub fn with_text_output(self, text: Option<String>) -> Self {
        self.with(FieldUpdate::TextOutput(text))
    }

    /// Sets the pending image bytes.
    #[must_use]
    pub fn with_generated_image(self, image: Option<GeneratedImage>) -> Self {
        self.with(FieldUpdate::GeneratedImage(image))
    }

    /// Sets the image output reference.
    #[must_use]
    pub fn with_image_output(self, reference: Option<String>) -> Self {
        self.with(FieldUpdate::ImageOutput(reference))
    }

    /// Sets the video output URL.
    #[must_use]
    pub fn with_video_output(self, url: Option<String>) -> Self {
        self.with(FieldUpdate::VideoOutput(url))
    }

    /// Sets the linked generated-output id.
    #[must_use]
    pub fn with_generated_output_id(self, id: Option<String>) -> Self {
        self.with(FieldUpdate::GeneratedOutputId(id))
    }

    /// Sets the run status.
    #[must_use]
    pub fn with_status(self, status: RunStatus) -> Self {
        self.with(FieldUpdate::Status(status))
    }

    /// Appends every field of `other`, replacing fields present in both.
    pub fn extend(&mut self, other: Self) {
        for update in other.fields {
            self.set(update);
        }
    }

    /// Returns the update for a field, if present.
    #[must_use]
    pub fn get(&self, field: ContextField) -> Option<&FieldUpdate> {
        self.fields.iter().find(|update| update.field() == field)
    }

    /// Returns the status assignment, if present.
    #[must_use]
    pub fn status_update(&self) -> Option<&FieldUpdate> {
        self.get(ContextField::Status)
    }

    /// Returns the fields written by this update.
    pub fn fields(&self) -> impl Iterator<Item = ContextField> + '_ {
        self.fields.iter().map(FieldUpdate::field)
    }

    /// Returns true if the update writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Consumes the update, yielding its field assignments.
    #[must_use]
    pub fn into_fields(self) -> Vec<FieldUpdate> {
        self.fields
    }

    /// Merges updates from concurrent writers.
    ///
    /// # Errors
    ///
    /// Returns a [`DataConflictError`] if two writers set the same field.
    pub fn merge_disjoint<W, I>(updates: I) -> Result<Self, DataConflictError>
    where
        W: AsRef<str>,
        I: IntoIterator<Item = (W, Self)>,
    {
        let mut owners: Vec<(ContextField, String)> = Vec::new();
        let mut merged = Self::new();

        for (writer, update) in updates {
            let writer = writer.as_ref();
            for field in update.fields() {
                if let Some((_, first)) = owners.iter().find(|(owned, _)| *owned == field) {
                    return Err(DataConflictError::new(field.to_string(), first, writer));
                }
                owners.push((field, writer.to_string()));
            }
            merged.extend(update);
        }

        Ok(merged)
    }
}
