//! Free-text name resolution. One implementation backs every by-name tool
//! (delete, update, enroll, pay, note), parameterized by entity kind — the
//! collection is fetched fresh from the store on every call because the
//! store is the source of truth and a stale match could route a payment or
//! deletion to the wrong record.

use crate::store::DataStore;
use crate::types::{CandidateRef, EntityKind, ResolutionOutcome};

/// Cap on the candidate list surfaced back for disambiguation.
pub(crate) const MAX_SUGGESTIONS: usize = 5;

pub(crate) fn resolve(
    store: &dyn DataStore,
    kind: EntityKind,
    query: &str,
) -> Result<ResolutionOutcome, String> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        // A blank needle would substring-match the whole collection.
        return Ok(ResolutionOutcome::NotFound);
    }

    let mut matches: Vec<CandidateRef> = store
        .candidates(kind)?
        .into_iter()
        .filter(|c| c.name.to_lowercase().contains(&needle))
        .collect();

    Ok(match matches.len() {
        0 => ResolutionOutcome::NotFound,
        1 => ResolutionOutcome::Found(matches.remove(0)),
        _ => {
            matches.truncate(MAX_SUGGESTIONS);
            ResolutionOutcome::Ambiguous(matches)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::temp_store;
    use crate::store::DataStore;

    #[test]
    fn test_resolve_single_partial_match() {
        let (store, path) = temp_store("resolve_single");
        store.add_student("Olena Ivanova", None, None, None).unwrap();
        store.add_student("Petro Bondar", None, None, None).unwrap();

        match resolve(&store, EntityKind::Student, "olena").unwrap() {
            ResolutionOutcome::Found(c) => assert_eq!(c.name, "Olena Ivanova"),
            other => panic!("expected Found, got {other:?}"),
        }
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_resolve_no_match() {
        let (store, path) = temp_store("resolve_none");
        store.add_student("Petro Bondar", None, None, None).unwrap();
        assert_eq!(
            resolve(&store, EntityKind::Student, "Olena").unwrap(),
            ResolutionOutcome::NotFound
        );
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_resolve_ambiguous_lists_all_in_store_order() {
        let (store, path) = temp_store("resolve_ambig");
        store.add_student("Olena Ivanova", None, None, None).unwrap();
        store.add_student("Petro Bondar", None, None, None).unwrap();
        store.add_student("Olena Shevchenko", None, None, None).unwrap();

        match resolve(&store, EntityKind::Student, "Olena").unwrap() {
            ResolutionOutcome::Ambiguous(candidates) => {
                let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
                assert_eq!(names, vec!["Olena Ivanova", "Olena Shevchenko"]);
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_resolve_caps_suggestions() {
        let (store, path) = temp_store("resolve_cap");
        for i in 0..8 {
            store.add_student(&format!("Olena {i}"), None, None, None).unwrap();
        }
        match resolve(&store, EntityKind::Student, "olena").unwrap() {
            ResolutionOutcome::Ambiguous(candidates) => {
                assert_eq!(candidates.len(), MAX_SUGGESTIONS);
                assert_eq!(candidates[0].name, "Olena 0");
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_resolve_blank_query_is_not_found() {
        let (store, path) = temp_store("resolve_blank");
        store.add_student("Olena Ivanova", None, None, None).unwrap();
        assert_eq!(
            resolve(&store, EntityKind::Student, "   ").unwrap(),
            ResolutionOutcome::NotFound
        );
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_resolve_other_kinds_share_the_logic() {
        let (store, path) = temp_store("resolve_kinds");
        store.add_course("Rust Basics", None, None, None).unwrap();
        store
            .add_task("Call the landlord", None, None, Default::default(), "2026-08-06")
            .unwrap();

        match resolve(&store, EntityKind::Course, "rust").unwrap() {
            ResolutionOutcome::Found(c) => assert_eq!(c.name, "Rust Basics"),
            other => panic!("expected Found, got {other:?}"),
        }
        match resolve(&store, EntityKind::Task, "landlord").unwrap() {
            ResolutionOutcome::Found(c) => assert_eq!(c.name, "Call the landlord"),
            other => panic!("expected Found, got {other:?}"),
        }
        std::fs::remove_file(&path).ok();
    }
}
