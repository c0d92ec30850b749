use crate::Answers;
use crate::navigation::VisibleFields;

/// Keeps only the answers whose field is on the visible path.
///
/// Values left behind for fields that a jump skipped are dropped even if the
/// caller still holds them.
pub fn filter_submission(answers: &Answers, visible: &VisibleFields<'_>) -> Answers {
    visible
        .fields()
        .filter_map(|field| {
            answers
                .get(&field.id)
                .map(|value| (field.id.clone(), value.clone()))
        })
        .collect()
}
