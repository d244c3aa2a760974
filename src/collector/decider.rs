use super::classifier::Classification;
use super::resolver::Resolution;
use crate::model::Action;

/// Choose what to do with a non-command event.
///
/// Priority: an edited update is always an edit; otherwise a continuation
/// appends to its predecessor whether or not it carries the trigger tag;
/// otherwise the trigger tag saves; anything else is ignored.
pub fn decide(is_edit: bool, classification: &Classification, resolution: &Resolution) -> Action {
    if is_edit {
        Action::Edit
    } else if resolution.is_continuation {
        Action::Append {
            target: resolution.target,
        }
    } else if classification.has_trigger() {
        Action::Save
    } else {
        Action::Ignore
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TRIGGER_TAG;

    fn tagged(tags: &[&str]) -> Classification {
        Classification {
            command: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn standalone(id: i32) -> Resolution {
        Resolution {
            is_continuation: false,
            target: id,
        }
    }

    fn continuing(id: i32) -> Resolution {
        Resolution {
            is_continuation: true,
            target: id - 1,
        }
    }

    #[test]
    fn test_trigger_saves() {
        assert_eq!(decide(false, &tagged(&[TRIGGER_TAG]), &standalone(5)), Action::Save);
    }

    #[test]
    fn test_untagged_standalone_ignored() {
        assert_eq!(decide(false, &tagged(&[]), &standalone(5)), Action::Ignore);
        assert_eq!(decide(false, &tagged(&["#other"]), &standalone(5)), Action::Ignore);
    }

    #[test]
    fn test_continuation_appends_regardless_of_tag() {
        assert_eq!(
            decide(false, &tagged(&[]), &continuing(101)),
            Action::Append { target: 100 }
        );
        assert_eq!(
            decide(false, &tagged(&[TRIGGER_TAG]), &continuing(101)),
            Action::Append { target: 100 }
        );
    }

    #[test]
    fn test_edit_has_top_priority() {
        assert_eq!(decide(true, &tagged(&[TRIGGER_TAG]), &continuing(101)), Action::Edit);
        assert_eq!(decide(true, &tagged(&[]), &standalone(7)), Action::Edit);
    }
}
