#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use ripple_core::{ArrayChange, ArrayModification};

#[derive(Arbitrary, Debug)]
enum Edit {
    Insert { at: u8 },
    Remove { at: u8 },
    Move { from: u8, to: u8 },
}

fuzz_target!(|input: (u8, Vec<Edit>)| {
    let (initial_len, edits) = input;
    let initial: Vec<u32> = (0..u32::from(initial_len % 64)).collect();
    let mut current = initial.clone();
    let mut next_id = 1000u32;
    let mut change = ArrayChange::new(initial.len());

    // Elements are unique, so move pairing is never ambiguous.
    for edit in edits.iter().take(64) {
        let len = current.len();
        match edit {
            Edit::Insert { at } => {
                let at = usize::from(*at) % (len + 1);
                current.insert(at, next_id);
                change.push(ArrayModification::Insert {
                    element: next_id,
                    at,
                });
                next_id += 1;
            }
            Edit::Remove { at } if len > 0 => {
                let at = usize::from(*at) % len;
                let element = current.remove(at);
                change.push(ArrayModification::Remove { element, at });
            }
            Edit::Move { from, to } if len > 0 => {
                let from = usize::from(*from) % len;
                let element = current.remove(from);
                change.push(ArrayModification::Remove { element, at: from });
                let to = usize::from(*to) % len;
                current.insert(to, element);
                change.push(ArrayModification::Insert { element, at: to });
            }
            _ => {}
        }
    }

    let batched = match change.try_batched() {
        Ok(batched) => batched,
        Err(violation) => panic!("unique elements must batch: {violation}"),
    };

    for &(from, to) in &batched.moved {
        assert_eq!(initial[from], current[to]);
    }
    for &index in &batched.deleted {
        assert!(!current.contains(&initial[index]));
    }
    for &index in &batched.inserted {
        assert!(!initial.contains(&current[index]));
    }
    assert_eq!(
        initial.len() - batched.deleted.len() + batched.inserted.len(),
        current.len()
    );
});
