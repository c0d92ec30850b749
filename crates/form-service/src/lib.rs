use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use form_spec::{
    Answers, CacheError, ExportError, ExportFormat, FormCache, FormCatalog, FormSchema, FormStore,
    GenerateError, Generator, JsonFileStore, RenderPayload, RuleError, SchemaIssue, StoreError,
    Submission, ValidationError, ValidationResult, build_render_payload, export, export_file_name,
    filter_submission, parse_generated, validate, visible_fields,
};

pub mod llm;
pub mod settings;

pub use llm::{ChatClient, list_models, model_ids};
pub use settings::{Provider, ResolvedProvider, Settings, SettingsError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Rules(#[from] RuleError),
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("form '{0}' is an unsaved draft; save it before collecting submissions")]
    Draft(String),
    #[error("submission rejected: {}", summarize(.0))]
    Validation(Vec<ValidationError>),
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|error| error.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// An export rendered in memory together with its suggested file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub file_name: String,
    pub format: ExportFormat,
    pub body: Vec<u8>,
}

/// Application facade over the catalog, the local form cache and generators.
#[derive(Debug)]
pub struct FormService<S> {
    catalog: FormCatalog<S>,
    cache: FormCache,
}

impl FormService<JsonFileStore> {
    /// Opens the store and cache kept under `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let data_dir = data_dir.as_ref();
        debug!(data_dir = %data_dir.display(), "opening form service");
        let cache = FormCache::load_in_dir(data_dir)?;
        Ok(Self::new(JsonFileStore::in_dir(data_dir), cache))
    }
}

impl<S: FormStore> FormService<S> {
    pub fn new(store: S, cache: FormCache) -> Self {
        Self {
            catalog: FormCatalog::new(store),
            cache,
        }
    }

    pub fn catalog(&self) -> &FormCatalog<S> {
        &self.catalog
    }

    pub fn cache(&self) -> &FormCache {
        &self.cache
    }

    /// Drafts a form from a description and keeps it in the local cache.
    ///
    /// The draft is not stored until [`FormService::save_form`] is called.
    pub fn generate_form<G: Generator + ?Sized>(
        &mut self,
        generator: &G,
        prompt: &str,
    ) -> Result<FormSchema, ServiceError> {
        let raw = generator.generate(prompt)?;
        if raw.trim().is_empty() {
            return Err(GenerateError::EmptyResponse.into());
        }
        let form = parse_generated(&raw)?;
        info!(form_id = %form.id, fields = form.fields.len(), "generated form draft");
        self.remember(form.clone())?;
        Ok(form)
    }

    /// Stores a form under a fresh id when its own is blank or taken.
    pub fn import(&mut self, form: FormSchema) -> Result<FormSchema, ServiceError> {
        let form = self.catalog.create(form)?;
        self.remember(form.clone())?;
        Ok(form)
    }

    /// Upserts the form, e.g. a cached draft or an edited schema.
    pub fn save_form(&mut self, form: FormSchema) -> Result<FormSchema, ServiceError> {
        let form = self.catalog.save(form)?;
        self.remember(form.clone())?;
        Ok(form)
    }

    /// Resolves a form, preferring the cached copy over the store.
    pub fn form(&self, id: &str) -> Result<FormSchema, ServiceError> {
        if let Some(form) = self.cache.get(id) {
            debug!(form_id = %id, "form served from cache");
            return Ok(form.clone());
        }
        Ok(self.catalog.get(id)?)
    }

    pub fn list(&self) -> Result<Vec<FormSchema>, ServiceError> {
        Ok(self.catalog.list()?)
    }

    /// Renames a stored form or an unsaved draft.
    pub fn rename(&mut self, id: &str, title: &str) -> Result<FormSchema, ServiceError> {
        let form = match self.catalog.rename(id, title) {
            Ok(form) => form,
            Err(err) if err.is_not_found() => {
                let mut draft = self.cache.get(id).cloned().ok_or(err)?;
                draft.title = title.to_string();
                info!(form_id = %id, title = %title, "renamed draft");
                draft
            }
            Err(err) => return Err(err.into()),
        };
        if self.cache.get(id).is_some() {
            self.remember(form.clone())?;
        }
        Ok(form)
    }

    /// Deletes the form, its submissions and any cached copy.
    ///
    /// An unsaved draft only lives in the cache and is simply dropped.
    pub fn delete(&mut self, id: &str) -> Result<(), ServiceError> {
        let stored = match self.catalog.delete(id) {
            Ok(()) => true,
            Err(err) if err.is_not_found() => false,
            Err(err) => return Err(err.into()),
        };
        if self.cache.remove(id).is_some() {
            self.cache.save()?;
            if !stored {
                info!(form_id = %id, "discarded draft");
            }
        } else if !stored {
            return Err(StoreError::form_not_found(id).into());
        }
        Ok(())
    }

    /// Ids of the fields on the current path.
    pub fn visible(&self, id: &str, answers: &Answers) -> Result<Vec<String>, ServiceError> {
        let form = self.form(id)?;
        let visible = visible_fields(&form, answers);
        Ok(visible.ids().into_iter().map(str::to_string).collect())
    }

    pub fn validate(&self, id: &str, answers: &Answers) -> Result<ValidationResult, ServiceError> {
        let form = self.form(id)?;
        Ok(validate(&form, answers)?)
    }

    pub fn render(&self, id: &str, answers: &Answers) -> Result<RenderPayload, ServiceError> {
        let form = self.form(id)?;
        Ok(build_render_payload(&form, answers)?)
    }

    /// Evaluates the path, validates it and records only the visible answers.
    ///
    /// Drafts that were never saved do not accept submissions.
    pub fn submit(&mut self, id: &str, answers: &Answers) -> Result<Submission, ServiceError> {
        self.require_stored(id)?;
        let form = self.form(id)?;
        let visible = visible_fields(&form, answers);
        let result = validate(&form, answers)?;
        if !result.valid {
            debug!(form_id = %id, errors = result.errors.len(), "submission rejected");
            return Err(ServiceError::Validation(result.errors));
        }
        let data = filter_submission(&result.values, &visible);
        Ok(self.catalog.record_submission(&form.id, data)?)
    }

    pub fn submissions(&self, id: &str) -> Result<Vec<Submission>, ServiceError> {
        Ok(self.catalog.submissions(id)?)
    }

    pub fn export(&self, id: &str, format: ExportFormat) -> Result<ExportedFile, ServiceError> {
        let form = self.form(id)?;
        let submissions = self.catalog.submissions(id)?;
        let body = export(&form, &submissions, format)?;
        Ok(ExportedFile {
            file_name: export_file_name(&form, format, form_spec::export::today()),
            format,
            body,
        })
    }

    pub fn lint(&self, id: &str) -> Result<Vec<SchemaIssue>, ServiceError> {
        Ok(self.form(id)?.issues())
    }

    fn require_stored(&self, id: &str) -> Result<(), ServiceError> {
        match self.catalog.get(id) {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() && self.cache.get(id).is_some() => {
                Err(ServiceError::Draft(id.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn remember(&mut self, form: FormSchema) -> Result<(), ServiceError> {
        self.cache.insert(form);
        self.cache.save()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use form_spec::{FieldType, FormField, MemoryStore};
    use serde_json::{Value, json};
    use tempfile::TempDir;

    struct CannedGenerator(String);

    impl Generator for CannedGenerator {
        fn generate(&self, _prompt: &str) -> Result<String, GenerateError> {
            Ok(self.0.clone())
        }
    }

    fn service(dir: &TempDir) -> FormService<MemoryStore> {
        let cache = FormCache::load_in_dir(dir.path()).expect("cache");
        FormService::new(MemoryStore::new(), cache)
    }

    fn answers(value: Value) -> Answers {
        value.as_object().cloned().expect("object")
    }

    fn rsvp() -> FormSchema {
        FormSchema::new(
            "rsvp",
            "Team Lunch",
            vec![
                FormField::new("coming", "Coming?", FieldType::Radio)
                    .required()
                    .with_options(["Yes", "No"])
                    .jump("No", "email"),
                FormField::new("guests", "Guests", FieldType::Number).required(),
                FormField::new("email", "Email", FieldType::Email).required(),
            ],
        )
    }

    #[test]
    fn generated_draft_is_cached_but_not_stored() {
        let dir = TempDir::new().unwrap();
        let mut service = service(&dir);
        let raw = "```json\n{\"id\":\"\",\"title\":\"Poll\",\"fields\":[{\"id\":\"q\",\"label\":\"Q\",\"type\":\"text\"}],\"createdAt\":0}\n```";
        let draft = service
            .generate_form(&CannedGenerator(raw.into()), "a poll")
            .unwrap();

        assert!(!draft.id.is_empty());
        assert!(draft.has_valid_created_at());
        assert_eq!(service.form(&draft.id).unwrap().title, "Poll");
        assert!(service.list().unwrap().is_empty());

        service.save_form(draft.clone()).unwrap();
        assert_eq!(service.list().unwrap().len(), 1);
    }

    fn draft(service: &mut FormService<MemoryStore>) -> FormSchema {
        let raw = r#"{"id":"d1","title":"Poll","fields":[{"id":"q","label":"Q","type":"text"}],"createdAt":0}"#;
        service
            .generate_form(&CannedGenerator(raw.into()), "a poll")
            .unwrap()
    }

    #[test]
    fn drafts_can_be_renamed() {
        let dir = TempDir::new().unwrap();
        let mut service = service(&dir);
        let draft = draft(&mut service);

        let renamed = service.rename(&draft.id, "Lunch poll").unwrap();
        assert_eq!(renamed.title, "Lunch poll");
        assert_eq!(service.form(&draft.id).unwrap().title, "Lunch poll");
        assert!(service.list().unwrap().is_empty());
    }

    #[test]
    fn drafts_can_be_deleted() {
        let dir = TempDir::new().unwrap();
        let mut service = service(&dir);
        let draft = draft(&mut service);

        service.delete(&draft.id).unwrap();
        assert!(service.cache().get(&draft.id).is_none());
        assert!(matches!(
            service.form(&draft.id),
            Err(ServiceError::Store(StoreError::NotFound { .. }))
        ));
        assert!(matches!(
            service.delete(&draft.id),
            Err(ServiceError::Store(StoreError::NotFound { .. }))
        ));
    }

    #[test]
    fn drafts_reject_submissions_until_saved() {
        let dir = TempDir::new().unwrap();
        let mut service = service(&dir);
        let draft = draft(&mut service);
        let state = answers(json!({ "q": "yes" }));

        let err = service.submit(&draft.id, &state).unwrap_err();
        assert!(matches!(err, ServiceError::Draft(ref id) if id == "d1"));
        assert!(service.submissions(&draft.id).unwrap().is_empty());

        service.save_form(draft.clone()).unwrap();
        let submission = service.submit(&draft.id, &state).unwrap();
        assert_eq!(submission.form_id, "d1");
    }

    #[test]
    fn blank_generator_output_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut service = service(&dir);
        let err = service
            .generate_form(&CannedGenerator("  ".into()), "anything")
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Generate(GenerateError::EmptyResponse)
        ));
    }

    #[test]
    fn submit_records_only_visible_answers() {
        let dir = TempDir::new().unwrap();
        let mut service = service(&dir);
        service.import(rsvp()).unwrap();

        let submission = service
            .submit(
                "rsvp",
                &answers(json!({ "coming": "No", "guests": 4, "email": "ada@example.org" })),
            )
            .unwrap();

        assert_eq!(submission.form_id, "rsvp");
        assert!(!submission.data.contains_key("guests"));
        assert_eq!(submission.data["email"], "ada@example.org");
        assert_eq!(service.submissions("rsvp").unwrap().len(), 1);
    }

    #[test]
    fn invalid_submission_is_not_recorded() {
        let dir = TempDir::new().unwrap();
        let mut service = service(&dir);
        service.import(rsvp()).unwrap();

        let err = service
            .submit("rsvp", &answers(json!({ "coming": "Yes", "email": "nope" })))
            .unwrap_err();
        let ServiceError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        let fields = errors.iter().map(|e| e.field_id.as_str()).collect::<Vec<_>>();
        assert_eq!(fields, vec!["guests", "email"]);
        assert!(service.submissions("rsvp").unwrap().is_empty());
    }

    #[test]
    fn rename_and_delete_keep_cache_coherent() {
        let dir = TempDir::new().unwrap();
        let mut service = service(&dir);
        service.import(rsvp()).unwrap();

        service.rename("rsvp", "Team Dinner").unwrap();
        assert_eq!(service.cache().get("rsvp").unwrap().title, "Team Dinner");

        service.delete("rsvp").unwrap();
        assert!(service.cache().get("rsvp").is_none());
        assert!(matches!(
            service.form("rsvp"),
            Err(ServiceError::Store(StoreError::NotFound { .. }))
        ));
    }

    #[test]
    fn visible_and_render_follow_answers() {
        let dir = TempDir::new().unwrap();
        let mut service = service(&dir);
        service.import(rsvp()).unwrap();

        let state = answers(json!({ "coming": "No" }));
        assert_eq!(service.visible("rsvp", &state).unwrap(), vec!["coming", "email"]);
        let payload = service.render("rsvp", &state).unwrap();
        assert_eq!(payload.next_field_id.as_deref(), Some("email"));
    }

    #[test]
    fn export_names_file_after_title() {
        let dir = TempDir::new().unwrap();
        let mut service = service(&dir);
        service.import(rsvp()).unwrap();
        service
            .submit(
                "rsvp",
                &answers(json!({ "coming": "Yes", "guests": "2", "email": "a@b.io" })),
            )
            .unwrap();

        let file = service.export("rsvp", ExportFormat::Csv).unwrap();
        assert!(file.file_name.starts_with("Team_Lunch_submissions_"));
        assert!(file.file_name.ends_with(".csv"));
        let body = String::from_utf8(file.body).unwrap();
        let mut lines = body.lines();
        assert_eq!(lines.next(), Some("Submitted At,Coming?,Guests,Email"));
        assert!(lines.next().unwrap().ends_with(",Yes,2,a@b.io"));
    }

    #[test]
    fn lint_reports_schema_issues() {
        let dir = TempDir::new().unwrap();
        let mut service = service(&dir);
        let mut form = rsvp();
        form.fields[2].logic.push(form_spec::JumpRule {
            condition: "*".into(),
            destination: "coming".into(),
        });
        service.import(form).unwrap();
        let issues = service.lint("rsvp").unwrap();
        assert_eq!(issues.len(), 1);
    }
}
