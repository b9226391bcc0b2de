use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use wavebound_engine::{PhaseKind, PhaseQueue};

const SEQUENCES: u64 = 500;
const OPS_PER_SEQUENCE: usize = 40;

fn labels(queue: &PhaseQueue) -> Vec<String> {
    queue
        .iter()
        .map(|phase| match &phase.kind {
            PhaseKind::Message { text, .. } => text.clone(),
            other => other.name().to_string(),
        })
        .collect()
}

/// Reference model: phases placed ahead of the old continuation, the old
/// continuation itself, and unmarked appends behind it.
#[derive(Default)]
struct Model {
    front: Vec<String>,
    marks: Vec<usize>,
    old: Vec<String>,
    tail: Vec<String>,
}

impl Model {
    fn prepend(&mut self, label: String) {
        self.front.insert(0, label);
        for mark in &mut self.marks {
            *mark += 1;
        }
    }

    fn append(&mut self, label: String) {
        let Some(at) = self.marks.last().copied() else {
            self.tail.push(label);
            return;
        };
        self.front.insert(at, label);
        for mark in &mut self.marks {
            if *mark >= at {
                *mark += 1;
            }
        }
    }

    fn mark(&mut self) {
        self.marks.push(self.front.len());
    }

    fn clear_mark(&mut self) {
        self.marks.pop();
    }

    fn order(&self) -> Vec<String> {
        self.front
            .iter()
            .chain(&self.old)
            .chain(&self.tail)
            .cloned()
            .collect()
    }
}

#[test]
fn randomized_operations_match_the_reference_order() {
    for seed in 0..SEQUENCES {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut queue = PhaseQueue::new();
        let mut model = Model::default();

        let old_len = rng.gen_range(0..4);
        for n in 0..old_len {
            let label = format!("old-{n}");
            queue.enqueue_append(PhaseKind::message(label.clone()));
            model.old.push(label);
        }

        let mut ops = Vec::new();
        for step in 0..OPS_PER_SEQUENCE {
            match rng.gen_range(0..10) {
                0..=2 => {
                    let label = format!("p{step}");
                    queue.enqueue_prepend(PhaseKind::message(label.clone()));
                    model.prepend(label);
                    ops.push("prepend");
                }
                3..=6 => {
                    let label = format!("a{step}");
                    queue.enqueue_append(PhaseKind::message(label.clone()));
                    model.append(label);
                    ops.push("append");
                }
                7 | 8 => {
                    queue.mark_splice_insertion_point();
                    model.mark();
                    ops.push("mark");
                }
                _ => {
                    queue.clear_splice_insertion_point();
                    model.clear_mark();
                    ops.push("clear");
                }
            }
        }

        assert_eq!(
            labels(&queue),
            model.order(),
            "seed {seed} diverged after {ops:?}"
        );
        assert_eq!(queue.splice_depth(), model.marks.len());
    }
}

#[test]
fn prepends_without_marks_run_in_reverse_order_of_insertion() {
    let mut rng = ChaCha20Rng::seed_from_u64(0xBEEF);
    let mut queue = PhaseQueue::new();
    queue.enqueue_append(PhaseKind::message("continuation"));
    let count = rng.gen_range(3..12);
    for n in 0..count {
        queue.enqueue_prepend(PhaseKind::message(format!("p{n}")));
    }
    let mut expected: Vec<String> = (0..count).rev().map(|n| format!("p{n}")).collect();
    expected.push("continuation".into());
    assert_eq!(labels(&queue), expected);
}

#[test]
fn spliced_phases_run_before_the_old_continuation() {
    let mut queue = PhaseQueue::new();
    queue.enqueue_append(PhaseKind::message("X"));
    queue.enqueue_append(PhaseKind::message("Y"));

    queue.mark_splice_insertion_point();
    for label in ["A", "B", "C"] {
        queue.enqueue_append(PhaseKind::message(label));
    }
    queue.clear_splice_insertion_point();
    queue.enqueue_append(PhaseKind::message("Z"));

    assert_eq!(labels(&queue), vec!["A", "B", "C", "X", "Y", "Z"]);
    assert_eq!(queue.clear_splice_insertion_point(), None);
}

#[test]
fn splice_survives_interleaved_prepends() {
    let mut queue = PhaseQueue::new();
    queue.enqueue_append(PhaseKind::message("old"));

    queue.enqueue_prepend(PhaseKind::message("urgent"));
    queue.mark_splice_insertion_point();
    queue.enqueue_append(PhaseKind::message("A"));
    queue.enqueue_prepend(PhaseKind::message("more urgent"));
    queue.enqueue_append(PhaseKind::message("B"));
    queue.enqueue_append(PhaseKind::message("C"));
    queue.clear_splice_insertion_point();

    assert_eq!(
        labels(&queue),
        vec!["more urgent", "urgent", "A", "B", "C", "old"]
    );
}

#[test]
fn clearing_drops_marks_and_pending_work() {
    let mut queue = PhaseQueue::new();
    queue.enqueue_append(PhaseKind::TurnInit);
    queue.mark_splice_insertion_point();
    queue.mark_splice_insertion_point();
    queue.enqueue_append(PhaseKind::message("spliced"));
    queue.clear_all();

    assert!(queue.is_empty());
    assert_eq!(queue.splice_depth(), 0);
    queue.enqueue_append(PhaseKind::message("after"));
    assert_eq!(labels(&queue), vec!["after"]);
}
