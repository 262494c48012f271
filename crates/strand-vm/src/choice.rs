//! Choice generators: enumerable nondeterministic decisions.
//!
//! The interpreter creates a generator at a choice point and hands it to
//! the search driver, which is the only component that moves its cursor.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use strand_common_core::TypeCode;

use crate::heap::ObjRef;
use crate::thread::ThreadId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChoiceKind {
    Threads,
    Bool,
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ChoiceKind {
    /// Generator kind for a nondeterministic source returning `t`.
    pub fn for_return_type(t: TypeCode) -> Self {
        match t {
            TypeCode::Boolean => Self::Bool,
            TypeCode::Byte | TypeCode::Char | TypeCode::Short | TypeCode::Int => Self::Int,
            TypeCode::Long => Self::Long,
            TypeCode::Float => Self::Float,
            TypeCode::Double => Self::Double,
            TypeCode::Reference | TypeCode::Array | TypeCode::Void => Self::Reference,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChoiceDomain {
    Threads(Vec<ThreadId>),
    Bool,
    IntRange { min: i32, max: i32 },
    LongRange { min: i64, max: i64 },
    Floats(Vec<f32>),
    Doubles(Vec<f64>),
    References(Vec<ObjRef>),
}

// Floating point candidates hash by bit pattern.
impl Hash for ChoiceDomain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Self::Threads(v) => v.hash(state),
            Self::Bool => {}
            Self::IntRange { min, max } => (min, max).hash(state),
            Self::LongRange { min, max } => (min, max).hash(state),
            Self::Floats(v) => v.iter().for_each(|f| f.to_bits().hash(state)),
            Self::Doubles(v) => v.iter().for_each(|d| d.to_bits().hash(state)),
            Self::References(v) => v.hash(state),
        }
    }
}

impl ChoiceDomain {
    pub fn kind(&self) -> ChoiceKind {
        match self {
            Self::Threads(_) => ChoiceKind::Threads,
            Self::Bool => ChoiceKind::Bool,
            Self::IntRange { .. } => ChoiceKind::Int,
            Self::LongRange { .. } => ChoiceKind::Long,
            Self::Floats(_) => ChoiceKind::Float,
            Self::Doubles(_) => ChoiceKind::Double,
            Self::References(_) => ChoiceKind::Reference,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Threads(v) => v.len(),
            Self::Bool => 2,
            Self::IntRange { min, max } => {
                if max < min {
                    0
                } else {
                    (*max as i64 - *min as i64) as usize + 1
                }
            }
            Self::LongRange { min, max } => {
                if max < min {
                    0
                } else {
                    let span = (*max as i128 - *min as i128) as u128;
                    usize::try_from(span).map_or(usize::MAX, |s| s.saturating_add(1))
                }
            }
            Self::Floats(v) => v.len(),
            Self::Doubles(v) => v.len(),
            Self::References(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> Option<Choice> {
        if i >= self.len() {
            return None;
        }
        Some(match self {
            Self::Threads(v) => Choice::Thread(v[i]),
            Self::Bool => Choice::Bool(i == 1),
            Self::IntRange { min, .. } => Choice::Int((*min as i64 + i as i64) as i32),
            Self::LongRange { min, .. } => Choice::Long(min.wrapping_add(i as i64)),
            Self::Floats(v) => Choice::Float(v[i]),
            Self::Doubles(v) => Choice::Double(v[i]),
            Self::References(v) => Choice::Reference(v[i]),
        })
    }
}

/// One value out of a domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Choice {
    Thread(ThreadId),
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Reference(ObjRef),
}

impl Choice {
    /// Operand-stack encoding of a data choice.
    pub fn to_slots(self) -> Vec<u64> {
        match self {
            Choice::Thread(t) => vec![t.0 as u64],
            Choice::Bool(b) => vec![b as u64],
            Choice::Int(v) => vec![v as i64 as u64],
            Choice::Long(v) => vec![v as u64, 0],
            Choice::Float(v) => vec![v.to_bits() as u64],
            Choice::Double(v) => vec![v.to_bits(), 0],
            Choice::Reference(r) => vec![r.to_slot()],
        }
    }
}

/// Marks a native method as a nondeterministic value source.
///
/// Integral ranges and reference candidates come from the call arguments;
/// floating point candidates are listed here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NondetSource {
    pub floats: Vec<f32>,
    pub doubles: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceGenerator {
    id: Arc<str>,
    domain: ChoiceDomain,
    /// Index of the current choice; `None` before the first advance.
    cursor: Option<usize>,
}

impl ChoiceGenerator {
    pub fn new(id: &str, domain: ChoiceDomain) -> Self {
        Self {
            id: id.into(),
            domain,
            cursor: None,
        }
    }

    pub fn threads(id: &str, threads: Vec<ThreadId>) -> Self {
        Self::new(id, ChoiceDomain::Threads(threads))
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn domain(&self) -> &ChoiceDomain {
        &self.domain
    }

    #[inline]
    pub fn kind(&self) -> ChoiceKind {
        self.domain.kind()
    }

    pub fn is_thread_choice(&self) -> bool {
        self.kind() == ChoiceKind::Threads
    }

    #[inline]
    pub fn total_choices(&self) -> usize {
        self.domain.len()
    }

    #[inline]
    pub fn processed_choices(&self) -> usize {
        self.cursor.map_or(0, |c| c + 1)
    }

    #[inline]
    pub fn has_more_choices(&self) -> bool {
        self.processed_choices() < self.total_choices()
    }

    /// Move to the next choice and return it.
    pub fn advance(&mut self) -> Option<Choice> {
        if !self.has_more_choices() {
            return None;
        }
        let next = self.processed_choices();
        self.cursor = Some(next);
        self.domain.get(next)
    }

    pub fn current(&self) -> Option<Choice> {
        self.domain.get(self.cursor?)
    }

    #[inline]
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Jump to choice `i`.
    pub fn select(&mut self, i: usize) -> Option<Choice> {
        let choice = self.domain.get(i)?;
        self.cursor = Some(i);
        Some(choice)
    }

    pub fn select_random(&mut self, rng: &mut fastrand::Rng) -> Option<Choice> {
        let n = self.total_choices();
        if n == 0 {
            return None;
        }
        self.select(rng.usize(..n))
    }

    pub fn reset(&mut self) {
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn drain(cg: &mut ChoiceGenerator) -> Vec<Choice> {
        let mut out = Vec::new();
        while let Some(c) = cg.advance() {
            out.push(c);
        }
        out
    }

    #[test]
    fn test_kind_for_return_type() {
        assert_eq!(ChoiceKind::for_return_type(TypeCode::Boolean), ChoiceKind::Bool);
        assert_eq!(ChoiceKind::for_return_type(TypeCode::Char), ChoiceKind::Int);
        assert_eq!(ChoiceKind::for_return_type(TypeCode::Long), ChoiceKind::Long);
        assert_eq!(ChoiceKind::for_return_type(TypeCode::Float), ChoiceKind::Float);
        assert_eq!(ChoiceKind::for_return_type(TypeCode::Array), ChoiceKind::Reference);
    }

    #[test]
    fn test_int_range_enumerates_all_values() {
        let mut cg = ChoiceGenerator::new("n", ChoiceDomain::IntRange { min: -1, max: 2 });
        assert_eq!(cg.total_choices(), 4);
        assert_eq!(cg.current(), None);
        assert_eq!(
            drain(&mut cg),
            vec![Choice::Int(-1), Choice::Int(0), Choice::Int(1), Choice::Int(2)]
        );
        assert!(!cg.has_more_choices());
        assert_eq!(cg.current(), Some(Choice::Int(2)));
        cg.reset();
        assert_eq!(cg.processed_choices(), 0);
        assert_eq!(cg.advance(), Some(Choice::Int(-1)));
    }

    #[test]
    fn test_bool_and_threads() {
        let mut b = ChoiceGenerator::new("b", ChoiceDomain::Bool);
        assert_eq!(drain(&mut b), vec![Choice::Bool(false), Choice::Bool(true)]);

        let mut t = ChoiceGenerator::threads("sched", vec![ThreadId(0), ThreadId(2)]);
        assert!(t.is_thread_choice());
        assert_eq!(drain(&mut t), vec![Choice::Thread(ThreadId(0)), Choice::Thread(ThreadId(2))]);
    }

    #[test]
    fn test_empty_and_wide_ranges() {
        let empty = ChoiceGenerator::new("e", ChoiceDomain::IntRange { min: 3, max: 2 });
        assert_eq!(empty.total_choices(), 0);
        assert!(!empty.has_more_choices());

        let wide = ChoiceDomain::IntRange { min: i32::MIN, max: i32::MAX };
        assert_eq!(wide.len(), 1usize << 32);
        assert_eq!(wide.get(0), Some(Choice::Int(i32::MIN)));

        let longs = ChoiceDomain::LongRange { min: i64::MAX - 1, max: i64::MAX };
        assert_eq!(longs.get(1), Some(Choice::Long(i64::MAX)));
    }

    #[test]
    fn test_select_random_stays_in_domain() {
        let mut rng = fastrand::Rng::with_seed(7);
        let mut cg = ChoiceGenerator::new("d", ChoiceDomain::Doubles(vec![0.5, 1.5]));
        for _ in 0..20 {
            let c = cg.select_random(&mut rng).unwrap();
            assert!(matches!(c, Choice::Double(v) if v == 0.5 || v == 1.5));
            assert_eq!(cg.current(), Some(c));
        }
    }

    #[test]
    fn test_slot_encoding() {
        assert_eq!(Choice::Int(-1).to_slots(), vec![u64::MAX]);
        assert_eq!(Choice::Long(5).to_slots(), vec![5, 0]);
        assert_eq!(Choice::Bool(true).to_slots(), vec![1]);
    }
}
