#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use ripple_core::{ArrayChange, ArrayModification, Change};

#[derive(Arbitrary, Debug)]
enum Edit {
    Insert { at: u8, element: u8 },
    Remove { at: u8 },
    Replace { at: u8, element: u8 },
    Splice { at: u8, len: u8, elements: Vec<u8> },
}

/// Apply `edit` to `current` and describe it as a modification.
fn modification(edit: &Edit, current: &mut Vec<u8>) -> Option<ArrayModification<u8>> {
    let len = current.len();
    match edit {
        Edit::Insert { at, element } => {
            let at = usize::from(*at) % (len + 1);
            current.insert(at, *element);
            Some(ArrayModification::Insert {
                element: *element,
                at,
            })
        }
        Edit::Remove { at } if len > 0 => {
            let at = usize::from(*at) % len;
            let element = current.remove(at);
            Some(ArrayModification::Remove { element, at })
        }
        Edit::Replace { at, element } if len > 0 => {
            let at = usize::from(*at) % len;
            let old = std::mem::replace(&mut current[at], *element);
            Some(ArrayModification::Replace {
                old,
                at,
                new: *element,
            })
        }
        Edit::Splice { at, len: n, elements } => {
            let at = usize::from(*at) % (len + 1);
            let end = (at + usize::from(*n % 8)).min(len);
            let new: Vec<u8> = elements.iter().take(8).copied().collect();
            let old: Vec<u8> = current.splice(at..end, new.iter().copied()).collect();
            ArrayModification::from_parts(at, old, new)
        }
        _ => None,
    }
}

fuzz_target!(|input: (Vec<u8>, Vec<Edit>)| {
    let (initial, edits) = input;
    let mut current = initial.clone();
    let mut change = ArrayChange::new(initial.len());
    for edit in edits.iter().take(64) {
        let before = current.clone();
        let Some(modification) = modification(edit, &mut current) else {
            continue;
        };
        let single = ArrayChange::with_modification(before.len(), modification.clone());
        assert_eq!(single.applied(&before), current);
        change.push(modification);
    }

    assert_eq!(change.final_count(), current.len());
    assert_eq!(change.applied(&initial), current);
    assert_eq!(change.reversed().applied(&current), initial);
    assert_eq!(change.clone().merged(change.reversed()).applied(&initial), initial);
});
