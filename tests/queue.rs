//! Ring buffer contract: capacity enforcement, FIFO order, wraparound.

use cotwire::queue::RingBuffer;
use proptest::prelude::*;
use rstest::rstest;

#[rstest]
fn push_pop_fifo_order() {
    let mut buf = RingBuffer::new(4);
    assert!(buf.push(1).is_ok());
    assert!(buf.push(2).is_ok());
    assert!(buf.push(3).is_ok());
    assert_eq!(buf.pop(), Some(1));
    assert_eq!(buf.pop(), Some(2));
    assert_eq!(buf.pop(), Some(3));
}

#[rstest]
fn capacity_is_enforced() {
    let mut buf = RingBuffer::new(2);
    assert!(buf.push(1).is_ok());
    assert!(buf.push(2).is_ok());
    assert!(buf.is_full());
    // The rejected item comes back untouched.
    assert_eq!(buf.push(3), Err(3));
    assert_eq!(buf.len(), 2);
}

#[rstest]
fn pop_and_peek_on_empty() {
    let mut buf = RingBuffer::<u32>::new(2);
    assert_eq!(buf.pop(), None);
    assert_eq!(buf.peek(), None);
    assert_eq!(buf.len(), 0);
    assert!(buf.is_empty());
}

#[rstest]
fn peek_does_not_consume() {
    let mut buf = RingBuffer::new(2);
    assert!(buf.push("a").is_ok());
    assert_eq!(buf.peek(), Some(&"a"));
    assert_eq!(buf.len(), 1);
    assert_eq!(buf.pop(), Some("a"));
}

#[rstest]
fn wraparound_preserves_fifo_order() {
    let mut buf = RingBuffer::new(3);
    assert!(buf.push(1).is_ok());
    assert!(buf.push(2).is_ok());
    assert!(buf.push(3).is_ok());
    // Pop two so the head advances past the midpoint.
    assert_eq!(buf.pop(), Some(1));
    assert_eq!(buf.pop(), Some(2));
    // Push two more so the tail wraps around.
    assert!(buf.push(4).is_ok());
    assert!(buf.push(5).is_ok());
    // Remaining items still come out in FIFO order.
    assert_eq!(buf.pop(), Some(3));
    assert_eq!(buf.pop(), Some(4));
    assert_eq!(buf.pop(), Some(5));
    assert_eq!(buf.pop(), None);
}

#[rstest]
#[should_panic(expected = "capacity must be non-zero")]
fn zero_capacity_is_rejected() {
    let _ = RingBuffer::<u32>::new(0);
}

#[derive(Clone, Debug)]
enum Op {
    Push(u32),
    Pop,
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![any::<u32>().prop_map(Op::Push), Just(Op::Pop)],
        0..256,
    )
}

proptest! {
    /// Any push/pop sequence behaves exactly like an unbounded FIFO with
    /// pushes beyond capacity rejected, including across wraparound.
    #[test]
    fn matches_a_model_queue(ops in ops(), capacity in 1usize..16) {
        let mut buf = RingBuffer::new(capacity);
        let mut model = std::collections::VecDeque::new();

        for op in ops {
            match op {
                Op::Push(value) => {
                    if model.len() < capacity {
                        prop_assert!(buf.push(value).is_ok());
                        model.push_back(value);
                    } else {
                        prop_assert_eq!(buf.push(value), Err(value));
                    }
                }
                Op::Pop => {
                    prop_assert_eq!(buf.pop(), model.pop_front());
                }
            }
            prop_assert_eq!(buf.len(), model.len());
            prop_assert_eq!(buf.is_full(), model.len() == capacity);
            prop_assert_eq!(buf.peek(), model.front());
        }

        // Whatever remains drains in order.
        while let Some(expected) = model.pop_front() {
            prop_assert_eq!(buf.pop(), Some(expected));
        }
        prop_assert_eq!(buf.pop(), None);
    }
}
