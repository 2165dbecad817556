use std::collections::{BTreeMap, HashSet};
use std::fmt;

use base64::{engine::general_purpose, Engine};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationError};

use crate::filter::QueryParams;
use crate::models::{Ad, AdSearch, Id};

/// Key for errors that belong to no single field.
pub const NON_FIELD_ERRORS: &str = "__all__";

pub const MAX_PICTURE_TITLE_LENGTH: usize = 255;
pub const MAX_PICTURES: usize = 4;
pub const MAX_PICTURE_BYTES: usize = 5 * 1024 * 1024;

const PICTURE_PREFIX: &str = "pictures-";

const REQUIRED: &str = "This field is required.";
const DUPLICATE_ID: &str = "Please correct the duplicate data for id, which must be unique.";

/// Field name to messages, serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (field, messages) in &self.0 {
            for message in messages {
                writeln!(f, "{}: {}", field, message)?;
            }
        }
        Ok(())
    }
}

impl From<validator::ValidationErrors> for ValidationErrors {
    fn from(source: validator::ValidationErrors) -> Self {
        let mut errors = Self::default();
        for (field, field_errors) in source.field_errors() {
            for error in field_errors {
                errors.add(&field, describe(error));
            }
        }
        errors
    }
}

/// User-facing text for a field error. Explicit messages win; `length`
/// errors are worded from their bounds.
fn describe(error: &ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }
    match error.code.as_ref() {
        "length" => {
            let max = error.params.get("max").and_then(|max| max.as_u64());
            let len = error
                .params
                .get("value")
                .and_then(|value| value.as_str())
                .map(|value| value.chars().count() as u64);
            match (max, len) {
                (Some(max), Some(len)) if len > max => {
                    format!("Ensure this value has at most {} characters.", max)
                }
                _ => REQUIRED.to_string(),
            }
        }
        code => code.to_string(),
    }
}

/// Runs the derived validation and maps failures to [`ValidationErrors`].
pub fn validate<T: Validate>(form: &T) -> Result<(), ValidationErrors> {
    form.validate().map_err(ValidationErrors::from)
}

fn trimmed<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().to_string())
}

fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let raw = trimmed(deserializer)?;
    Ok((!raw.is_empty()).then_some(raw))
}

fn checkbox<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(is_checked(&raw))
}

fn is_checked(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "on" | "true" | "1" | "yes"
    )
}

fn check_max_length(errors: &mut ValidationErrors, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.add(
            field,
            format!("Ensure this value has at most {} characters.", max),
        );
    }
}

/// Save-this-search form: the encoded filter parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct AdSearchForm {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 2550))]
    pub search: String,
}

/// Saved-search settings form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdSearchUpdateForm {
    #[serde(default, deserialize_with = "checkbox")]
    pub public: bool,
}

impl AdSearchUpdateForm {
    pub fn initial(search: &AdSearch) -> Self {
        Self {
            public: search.public,
        }
    }
}

/// Free-text message, used both for contacting an ad owner and for an ad
/// owner reaching out to a saved-search owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ContactForm {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1))]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct AdForm {
    #[serde(default, deserialize_with = "optional_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 2550))]
    pub user_entered_address: String,
    #[serde(default, deserialize_with = "checkbox")]
    pub visible: bool,
}

impl AdForm {
    pub fn initial(ad: &Ad) -> Self {
        Self {
            description: ad.description.clone(),
            user_entered_address: ad.user_entered_address.clone(),
            visible: ad.visible,
        }
    }
}

/// One row of the picture formset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PictureForm {
    pub id: Option<String>,
    #[serde(skip)]
    pub image: Option<String>,
    pub title: Option<String>,
    pub delete: bool,
}

impl PictureForm {
    fn is_blank(&self) -> bool {
        self.id.is_none() && self.image.is_none() && self.title.is_none() && !self.delete
    }
}

/// A validated picture row.
#[derive(Debug, Clone, PartialEq)]
pub enum PictureChange {
    Add {
        image: Vec<u8>,
        title: Option<String>,
    },
    Edit {
        id: Id,
        image: Option<Vec<u8>>,
        title: Option<String>,
    },
    Remove {
        id: Id,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormSetErrors {
    pub non_form_errors: Vec<String>,
    pub forms: Vec<ValidationErrors>,
}

impl FormSetErrors {
    pub fn non_form(message: impl Into<String>) -> Self {
        Self {
            non_form_errors: vec![message.into()],
            forms: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.non_form_errors.is_empty() && self.forms.iter().all(ValidationErrors::is_empty)
    }
}

/// Up to [`MAX_PICTURES`] rows submitted as `pictures-N-{id,image,title,DELETE}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PictureFormSet {
    pub forms: Vec<PictureForm>,
    #[serde(skip)]
    overflow: bool,
}

impl PictureFormSet {
    pub fn bind(params: &QueryParams) -> Self {
        let mut forms: Vec<PictureForm> = vec![PictureForm::default(); MAX_PICTURES];
        let mut overflow = false;

        for (key, value) in params.pairs() {
            let Some(rest) = key.strip_prefix(PICTURE_PREFIX) else {
                continue;
            };
            let Some((index, field)) = rest.split_once('-') else {
                continue;
            };
            let Ok(index) = index.parse::<usize>() else {
                continue;
            };
            let value = value.trim();
            if index >= MAX_PICTURES {
                if !value.is_empty() {
                    overflow = true;
                }
                continue;
            }
            let form = &mut forms[index];
            let present = (!value.is_empty()).then(|| value.to_string());
            match field {
                "id" => form.id = present,
                "image" => form.image = present,
                "title" => form.title = present,
                "DELETE" => form.delete = is_checked(value),
                _ => {}
            }
        }

        while forms.last().is_some_and(PictureForm::is_blank) {
            forms.pop();
        }
        Self { forms, overflow }
    }

    pub fn clean(&self) -> Result<Vec<PictureChange>, FormSetErrors> {
        let mut errors = FormSetErrors::default();
        if self.overflow {
            errors
                .non_form_errors
                .push(format!("Please submit {} or fewer pictures.", MAX_PICTURES));
        }

        let mut changes = Vec::new();
        let mut seen = HashSet::new();
        for form in &self.forms {
            let mut form_errors = ValidationErrors::default();
            if let Some(id) = form.id.as_deref().and_then(|id| id.parse::<Id>().ok()) {
                if !seen.insert(id) {
                    form_errors.add("id", DUPLICATE_ID);
                }
            }
            if let Some(change) = clean_picture(form, &mut form_errors) {
                changes.push(change);
            }
            errors.forms.push(form_errors);
        }

        if errors.is_empty() {
            Ok(changes)
        } else {
            Err(errors)
        }
    }
}

fn clean_picture(form: &PictureForm, errors: &mut ValidationErrors) -> Option<PictureChange> {
    if form.is_blank() {
        return None;
    }
    if let Some(title) = &form.title {
        check_max_length(errors, "title", title, MAX_PICTURE_TITLE_LENGTH);
    }
    let image = form.image.as_deref().and_then(|raw| decode_image(raw, errors));
    let id = match form.id.as_deref().map(str::parse::<Id>) {
        Some(Ok(id)) => Some(id),
        Some(Err(_)) => {
            errors.add("id", "Select a valid choice.");
            None
        }
        None => None,
    };
    if !errors.is_empty() {
        return None;
    }

    match (id, form.delete) {
        (Some(id), true) => Some(PictureChange::Remove { id }),
        (Some(id), false) => Some(PictureChange::Edit {
            id,
            image,
            title: form.title.clone(),
        }),
        // Deleting a row that was never saved is a no-op.
        (None, true) => None,
        (None, false) => match image {
            Some(image) => Some(PictureChange::Add {
                image,
                title: form.title.clone(),
            }),
            None => {
                errors.add("image", REQUIRED);
                None
            }
        },
    }
}

fn decode_image(raw: &str, errors: &mut ValidationErrors) -> Option<Vec<u8>> {
    match general_purpose::STANDARD.decode(raw) {
        Ok(bytes) if bytes.is_empty() => {
            errors.add("image", "The submitted file is empty.");
            None
        }
        Ok(bytes) if bytes.len() > MAX_PICTURE_BYTES => {
            errors.add(
                "image",
                format!("Pictures must be at most {} bytes.", MAX_PICTURE_BYTES),
            );
            None
        }
        Ok(bytes) => Some(bytes),
        Err(_) => {
            errors.add("image", "Upload a valid image.");
            None
        }
    }
}

/// The ad form plus its picture formset, validated together.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdSubmission {
    pub form: AdForm,
    pub pictures: PictureFormSet,
}

impl AdSubmission {
    pub fn bind(params: &QueryParams) -> Self {
        let form = params.deserialize_as().unwrap_or_else(|e| {
            warn!("Unreadable ad form: {}", e);
            AdForm::default()
        });
        Self {
            form,
            pictures: PictureFormSet::bind(params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_search_form_requires_a_bounded_value() {
        let form: AdSearchForm = params(&[("search", " q=flat ")]).deserialize_as().unwrap();
        assert_eq!(form.search, "q=flat");
        assert!(validate(&form).is_ok());

        let errors = validate(&AdSearchForm::default()).unwrap_err();
        assert_eq!(errors.get("search"), [REQUIRED.to_string()]);

        let long = "q=".to_string() + &"a".repeat(2550);
        let errors = validate(&AdSearchForm { search: long }).unwrap_err();
        assert_eq!(
            errors.get("search"),
            ["Ensure this value has at most 2550 characters.".to_string()]
        );
    }

    #[test]
    fn test_checkbox_values() {
        let checked = |pairs: &[(&str, &str)]| {
            params(pairs)
                .deserialize_as::<AdSearchUpdateForm>()
                .unwrap()
                .public
        };
        assert!(checked(&[("public", "on")]));
        assert!(!checked(&[]));
        assert!(!checked(&[("public", "off")]));
    }

    #[test]
    fn test_contact_form_rejects_blank_message() {
        let blank: ContactForm = params(&[("message", "   ")]).deserialize_as().unwrap();
        assert_eq!(
            validate(&blank).unwrap_err().get("message"),
            [REQUIRED.to_string()]
        );
        let hello: ContactForm = params(&[("message", "Hello")]).deserialize_as().unwrap();
        assert!(validate(&hello).is_ok());
    }

    #[test]
    fn test_ad_form_requires_address() {
        let submission = AdSubmission::bind(&params(&[
            ("description", "  "),
            ("visible", "on"),
            ("pictures-0-title", "Kitchen"),
        ]));
        let form = submission.form;
        assert_eq!(form.description, None);
        assert!(form.visible);
        let errors = validate(&form).unwrap_err();
        assert_eq!(errors.get("user_entered_address"), [REQUIRED.to_string()]);
    }

    #[test]
    fn test_repeated_ad_fields_keep_the_first_value() {
        let submission = AdSubmission::bind(&params(&[
            ("user_entered_address", "Paris"),
            ("user_entered_address", "Lyon"),
        ]));
        assert_eq!(submission.form.user_entered_address, "Paris");
    }

    #[test]
    fn test_picture_formset_cleans_rows() {
        let image = general_purpose::STANDARD.encode(b"jpeg bytes");
        let set = PictureFormSet::bind(&params(&[
            ("pictures-0-image", image.as_str()),
            ("pictures-0-title", "Kitchen"),
            ("pictures-1-id", "7"),
            ("pictures-1-DELETE", "on"),
            ("pictures-2-id", "8"),
            ("pictures-2-title", "Garden"),
        ]));

        let changes = set.clean().unwrap();
        assert_eq!(
            changes,
            vec![
                PictureChange::Add {
                    image: b"jpeg bytes".to_vec(),
                    title: Some("Kitchen".to_string())
                },
                PictureChange::Remove { id: 7 },
                PictureChange::Edit {
                    id: 8,
                    image: None,
                    title: Some("Garden".to_string())
                },
            ]
        );
    }

    #[test]
    fn test_picture_formset_reports_errors_per_row() {
        let set = PictureFormSet::bind(&params(&[
            ("pictures-0-image", "not base64!"),
            ("pictures-1-title", "Title only"),
        ]));

        let errors = set.clean().unwrap_err();
        assert_eq!(errors.forms.len(), 2);
        assert_eq!(errors.forms[0].get("image"), ["Upload a valid image.".to_string()]);
        assert_eq!(errors.forms[1].get("image"), [REQUIRED.to_string()]);
    }

    #[test]
    fn test_picture_formset_rejects_duplicate_ids() {
        let set = PictureFormSet::bind(&params(&[
            ("pictures-0-id", "7"),
            ("pictures-0-DELETE", "on"),
            ("pictures-1-id", "7"),
            ("pictures-1-DELETE", "on"),
        ]));

        let errors = set.clean().unwrap_err();
        assert!(errors.forms[0].is_empty());
        assert_eq!(errors.forms[1].get("id"), [DUPLICATE_ID.to_string()]);
    }

    #[test]
    fn test_picture_formset_rejects_extra_rows() {
        let set = PictureFormSet::bind(&params(&[("pictures-4-title", "fifth")]));
        let errors = set.clean().unwrap_err();
        assert_eq!(errors.non_form_errors.len(), 1);
    }

    #[test]
    fn test_blank_formset_is_valid_and_empty() {
        let set = PictureFormSet::bind(&params(&[("pictures-0-title", "")]));
        assert!(set.forms.is_empty());
        assert_eq!(set.clean().unwrap(), Vec::new());
    }
}
