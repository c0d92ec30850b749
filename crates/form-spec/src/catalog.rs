use tracing::{info, warn};
use uuid::Uuid;

use crate::Answers;
use crate::spec::{FormSchema, Submission};
use crate::store::{FormStore, StoreError};

/// Lifecycle operations for forms and their submissions.
#[derive(Debug, Clone)]
pub struct FormCatalog<S> {
    store: S,
}

impl<S: FormStore> FormCatalog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stores a new form.
    ///
    /// The supplied id is kept when it is non-blank and unused; otherwise a
    /// fresh UUID is assigned. A placeholder `created_at` becomes "now".
    pub fn create(&mut self, mut form: FormSchema) -> Result<FormSchema, StoreError> {
        if form.id.trim().is_empty() || self.store.get_form(&form.id)?.is_some() {
            form.id = Uuid::new_v4().to_string();
        }
        form.normalize_created_at();
        log_issues(&form);
        self.store.save_form(form.clone())?;
        info!(form_id = %form.id, title = %form.title, "created form");
        Ok(form)
    }

    pub fn get(&self, id: &str) -> Result<FormSchema, StoreError> {
        self.store
            .get_form(id)?
            .ok_or_else(|| StoreError::form_not_found(id))
    }

    /// Every form, newest first.
    pub fn list(&self) -> Result<Vec<FormSchema>, StoreError> {
        let mut forms = self.store.list_forms()?;
        forms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(forms)
    }

    pub fn rename(&mut self, id: &str, title: &str) -> Result<FormSchema, StoreError> {
        let mut form = self.get(id)?;
        form.title = title.to_string();
        self.store.save_form(form.clone())?;
        info!(form_id = %id, title = %title, "renamed form");
        Ok(form)
    }

    /// Writes the form wholesale, inserting it when the id is new.
    pub fn save(&mut self, mut form: FormSchema) -> Result<FormSchema, StoreError> {
        if form.id.trim().is_empty() {
            form.id = Uuid::new_v4().to_string();
        }
        form.normalize_created_at();
        log_issues(&form);
        self.store.save_form(form.clone())?;
        Ok(form)
    }

    /// Deletes the form together with all of its submissions.
    pub fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        if self.store.delete_form(id)? {
            info!(form_id = %id, "deleted form and its submissions");
            Ok(())
        } else {
            Err(StoreError::form_not_found(id))
        }
    }

    pub fn submissions(&self, form_id: &str) -> Result<Vec<Submission>, StoreError> {
        self.store.list_submissions(form_id)
    }

    /// Records already filtered answers as a new submission.
    pub fn record_submission(
        &mut self,
        form_id: &str,
        data: Answers,
    ) -> Result<Submission, StoreError> {
        let submission = Submission::new(form_id, data);
        self.store.add_submission(submission.clone())?;
        info!(form_id = %form_id, submission_id = %submission.id, "recorded submission");
        Ok(submission)
    }
}

fn log_issues(form: &FormSchema) {
    for issue in form.issues() {
        warn!(form_id = %form.id, "{}", issue);
    }
}
