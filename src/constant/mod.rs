/*! Constant values.

A constant [`Value`] is immutable and interned in a [`Manager`], alongside the
[`ty::Manager`](crate::ty::Manager) holding its type. Values come in three
shapes:

- [`ValueKind::Scalar`]: a single [`Literal`].
- [`ValueKind::Splat`]: one element repeated for every element of a composite type.
- [`ValueKind::Composite`]: an explicit list of element values.

[`Manager::composite`] always produces a splat when every element is the same
value, so the two composite shapes never describe the same value twice. Reads
through [`Manager::index`] do not care which shape a value has.
*/

mod eval;
mod kernels;
mod number;

pub use eval::{Eval, EvalResult, Failure, Function};
pub use kernels::KernelResult;
pub use number::{Float, Number};

use crate::arena::{Handle, UniqueArena};
use crate::ty::{self, Scalar, Type};

use std::{fmt, hash, hash::Hasher as _, ops};

/// A scalar constant payload.
#[derive(Clone, Copy, Debug)]
pub enum Literal {
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(f32),
    F16(half::f16),
    AbstractInt(i64),
    AbstractFloat(f64),
}

/// The bit-level identity of a [`Literal`], so that floats can be hashed and
/// compared for interning.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
enum HashableLiteral {
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(u32),
    F16(u16),
    AbstractInt(i64),
    AbstractFloat(u64),
}

impl From<Literal> for HashableLiteral {
    fn from(l: Literal) -> Self {
        match l {
            Literal::Bool(v) => Self::Bool(v),
            Literal::I32(v) => Self::I32(v),
            Literal::U32(v) => Self::U32(v),
            Literal::F32(v) => Self::F32(v.to_bits()),
            Literal::F16(v) => Self::F16(v.to_bits()),
            Literal::AbstractInt(v) => Self::AbstractInt(v),
            Literal::AbstractFloat(v) => Self::AbstractFloat(v.to_bits()),
        }
    }
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        HashableLiteral::from(*self) == HashableLiteral::from(*other)
    }
}

impl Eq for Literal {}

impl hash::Hash for Literal {
    fn hash<H: hash::Hasher>(&self, hasher: &mut H) {
        HashableLiteral::from(*self).hash(hasher)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v:?}"),
            Self::F16(v) => write!(f, "{:?}", v.to_f32()),
            Self::AbstractInt(v) => write!(f, "{v}"),
            Self::AbstractFloat(v) => write!(f, "{v:?}"),
        }
    }
}

impl Literal {
    pub const fn scalar(&self) -> Scalar {
        match *self {
            Self::Bool(_) => Scalar::Bool,
            Self::I32(_) => Scalar::I32,
            Self::U32(_) => Scalar::U32,
            Self::F32(_) => Scalar::F32,
            Self::F16(_) => Scalar::F16,
            Self::AbstractInt(_) => Scalar::AbstractInt,
            Self::AbstractFloat(_) => Scalar::AbstractFloat,
        }
    }

    pub fn zero(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Bool => Self::Bool(false),
            Scalar::I32 => Self::I32(0),
            Scalar::U32 => Self::U32(0),
            Scalar::F32 => Self::F32(0.0),
            Scalar::F16 => Self::F16(half::f16::ZERO),
            Scalar::AbstractInt => Self::AbstractInt(0),
            Scalar::AbstractFloat => Self::AbstractFloat(0.0),
        }
    }

    pub fn one(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Bool => Self::Bool(true),
            Scalar::I32 => Self::I32(1),
            Scalar::U32 => Self::U32(1),
            Scalar::F32 => Self::F32(1.0),
            Scalar::F16 => Self::F16(half::f16::ONE),
            Scalar::AbstractInt => Self::AbstractInt(1),
            Scalar::AbstractFloat => Self::AbstractFloat(1.0),
        }
    }

    /// Is this the zero value of its type?
    ///
    /// Negative zero is not: it is not what a zero-initialized value holds.
    pub fn is_zero(&self) -> bool {
        match HashableLiteral::from(*self) {
            HashableLiteral::Bool(v) => !v,
            HashableLiteral::I32(v) => v == 0,
            HashableLiteral::U32(v) => v == 0,
            HashableLiteral::F32(v) => v == 0,
            HashableLiteral::F16(v) => v == 0,
            HashableLiteral::AbstractInt(v) => v == 0,
            HashableLiteral::AbstractFloat(v) => v == 0,
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// The value of an integer literal, widened to `i64`.
    pub const fn as_integer(&self) -> Option<i64> {
        match *self {
            Self::I32(v) => Some(v as i64),
            Self::U32(v) => Some(v as i64),
            Self::AbstractInt(v) => Some(v),
            _ => None,
        }
    }
}

/// The shape of a constant [`Value`].
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum ValueKind {
    Scalar(Literal),
    /// `element` repeated `count` times.
    Splat {
        element: Handle<Value>,
        count: u32,
    },
    Composite(Vec<Handle<Value>>),
}

/// An interned constant value.
#[derive(Clone, Debug)]
pub struct Value {
    ty: Handle<Type>,
    kind: ValueKind,
    hash: u64,
    all_zero: bool,
    any_zero: bool,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.kind == other.kind
    }
}

impl Eq for Value {}

impl hash::Hash for Value {
    fn hash<H: hash::Hasher>(&self, hasher: &mut H) {
        hasher.write_u64(self.hash)
    }
}

impl Value {
    pub const fn ty(&self) -> Handle<Type> {
        self.ty
    }

    pub const fn kind(&self) -> &ValueKind {
        &self.kind
    }

    /// Structural hash: the type and every element, in order.
    pub const fn structural_hash(&self) -> u64 {
        self.hash
    }

    /// Is every scalar in this value a (positive) zero?
    pub const fn all_zero(&self) -> bool {
        self.all_zero
    }

    /// Is any scalar in this value a (positive) zero?
    pub const fn any_zero(&self) -> bool {
        self.any_zero
    }

    pub const fn literal(&self) -> Option<Literal> {
        match self.kind {
            ValueKind::Scalar(literal) => Some(literal),
            _ => None,
        }
    }
}

/// The interning table for constant values, and the types they refer to.
#[derive(Debug, Default)]
pub struct Manager {
    pub types: ty::Manager,
    values: UniqueArena<Value>,
}

impl ops::Index<Handle<Value>> for Manager {
    type Output = Value;
    fn index(&self, handle: Handle<Value>) -> &Value {
        &self.values[handle]
    }
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct values interned so far.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn intern(&mut self, ty: Handle<Type>, kind: ValueKind) -> Handle<Value> {
        let mut hasher = fxhash::FxHasher64::default();
        hash::Hash::hash(&ty, &mut hasher);
        let (all_zero, any_zero) = match kind {
            ValueKind::Scalar(literal) => {
                hash::Hash::hash(&literal, &mut hasher);
                let zero = literal.is_zero();
                (zero, zero)
            }
            ValueKind::Splat { element, count } => {
                let element = &self.values[element];
                for _ in 0..count {
                    hasher.write_u64(element.hash);
                }
                (element.all_zero, element.any_zero)
            }
            ValueKind::Composite(ref elements) => {
                let mut all_zero = true;
                let mut any_zero = false;
                for &element in elements {
                    let element = &self.values[element];
                    hasher.write_u64(element.hash);
                    all_zero &= element.all_zero;
                    any_zero |= element.any_zero;
                }
                (all_zero, any_zero)
            }
        };
        let value = Value {
            ty,
            kind,
            hash: hasher.finish(),
            all_zero,
            any_zero,
        };
        self.values.insert(value)
    }

    /// Intern a scalar constant of the literal's own type.
    pub fn scalar(&mut self, literal: Literal) -> Handle<Value> {
        let ty = self.types.scalar(literal.scalar());
        self.intern(ty, ValueKind::Scalar(literal))
    }

    pub fn bool(&mut self, value: bool) -> Handle<Value> {
        self.scalar(Literal::Bool(value))
    }

    pub fn i32(&mut self, value: i32) -> Handle<Value> {
        self.scalar(Literal::I32(value))
    }

    pub fn u32(&mut self, value: u32) -> Handle<Value> {
        self.scalar(Literal::U32(value))
    }

    pub fn f32(&mut self, value: f32) -> Handle<Value> {
        self.scalar(Literal::F32(value))
    }

    pub fn f16(&mut self, value: f32) -> Handle<Value> {
        self.scalar(Literal::F16(half::f16::from_f32(value)))
    }

    pub fn abstract_int(&mut self, value: i64) -> Handle<Value> {
        self.scalar(Literal::AbstractInt(value))
    }

    pub fn abstract_float(&mut self, value: f64) -> Handle<Value> {
        self.scalar(Literal::AbstractFloat(value))
    }

    /// A composite of type `ty` whose `count` elements are all `element`.
    pub fn splat(&mut self, ty: Handle<Type>, element: Handle<Value>, count: u32) -> Handle<Value> {
        assert_eq!(
            self.types.element_count(ty),
            Some(count as usize),
            "splat count does not match {}",
            self.types.name(ty)
        );
        debug_assert!(
            matches!(self.types[ty], Type::Struct { .. })
                || self.types.element(ty, 0) == Some(self.ty(element)),
            "splat element of type {} does not match {}",
            self.types.name(self.ty(element)),
            self.types.name(ty)
        );
        self.intern(ty, ValueKind::Splat { element, count })
    }

    /// A composite of type `ty` with the given elements.
    ///
    /// Produces a splat when all the elements are the same value.
    pub fn composite(&mut self, ty: Handle<Type>, elements: Vec<Handle<Value>>) -> Handle<Value> {
        assert_eq!(
            self.types.element_count(ty),
            Some(elements.len()),
            "wrong number of elements for {}",
            self.types.name(ty)
        );
        match elements.split_first() {
            Some((&first, rest)) if rest.iter().all(|&el| el == first) => {
                self.intern(ty, ValueKind::Splat {
                    element: first,
                    count: elements.len() as u32,
                })
            }
            _ => self.intern(ty, ValueKind::Composite(elements)),
        }
    }

    /// The zero value of `ty`.
    ///
    /// # Panics
    ///
    /// If `ty` has no zero value (runtime-sized arrays, textures, samplers).
    pub fn zero(&mut self, ty: Handle<Type>) -> Handle<Value> {
        match self.types[ty].clone() {
            Type::Scalar(scalar) => self.scalar(Literal::zero(scalar)),
            Type::Vector { size, scalar } => {
                let element = self.scalar(Literal::zero(scalar));
                self.splat(ty, element, size as u32)
            }
            Type::Matrix {
                columns,
                rows,
                scalar,
            } => {
                let column_ty = self.types.vec(scalar, rows);
                let column = self.zero(column_ty);
                self.splat(ty, column, columns as u32)
            }
            Type::Array {
                base,
                size: ty::ArraySize::Constant(count),
            } => {
                let element = self.zero(base);
                self.splat(ty, element, count)
            }
            Type::Struct { members, .. } => {
                let elements = members.iter().map(|m| self.zero(m.ty)).collect();
                self.composite(ty, elements)
            }
            _ => panic!("{} has no zero value", self.types.name(ty)),
        }
    }

    /// Number of elements of a composite value, `None` for scalars.
    pub fn element_count(&self, value: Handle<Value>) -> Option<usize> {
        match self.values[value].kind {
            ValueKind::Scalar(_) => None,
            ValueKind::Splat { count, .. } => Some(count as usize),
            ValueKind::Composite(ref elements) => Some(elements.len()),
        }
    }

    /// Element `index` of a composite value.
    ///
    /// Returns `None` for scalars and out-of-range indices.
    pub fn index(&self, value: Handle<Value>, index: usize) -> Option<Handle<Value>> {
        match self.values[value].kind {
            ValueKind::Scalar(_) => None,
            ValueKind::Splat { element, count } => (index < count as usize).then_some(element),
            ValueKind::Composite(ref elements) => elements.get(index).copied(),
        }
    }

    /// All the elements of a composite value, expanding splats.
    pub fn elements(&self, value: Handle<Value>) -> Vec<Handle<Value>> {
        match self.values[value].kind {
            ValueKind::Scalar(_) => Vec::new(),
            ValueKind::Splat { element, count } => vec![element; count as usize],
            ValueKind::Composite(ref elements) => elements.clone(),
        }
    }

    pub fn literal(&self, value: Handle<Value>) -> Option<Literal> {
        self.values[value].literal()
    }

    /// The scalars of a scalar or vector value, in order.
    pub fn literals(&self, value: Handle<Value>) -> Vec<Literal> {
        match self.values[value].kind {
            ValueKind::Scalar(literal) => vec![literal],
            _ => self
                .elements(value)
                .into_iter()
                .flat_map(|el| self.literals(el))
                .collect(),
        }
    }

    pub fn ty(&self, value: Handle<Value>) -> Handle<Type> {
        self.values[value].ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::VectorSize;

    #[test]
    fn scalars_are_interned() {
        let mut mgr = Manager::new();
        let a = mgr.f32(1.5);
        let b = mgr.f32(1.5);
        let c = mgr.f32(-1.5);
        assert_eq!(a, b);
        assert_ne!(a, c);
        let pz = mgr.f32(0.0);
        let nz = mgr.f32(-0.0);
        assert_ne!(pz, nz);
        assert!(mgr[pz].all_zero());
        assert!(!mgr[nz].all_zero());
    }

    #[test]
    fn splat_composite_equivalence() {
        let mut mgr = Manager::new();
        let vec4 = mgr.types.vec(Scalar::I32, VectorSize::Quad);
        let e = mgr.i32(7);
        let splat = mgr.splat(vec4, e, 4);
        let composite = mgr.composite(vec4, vec![e, e, e, e]);
        assert_eq!(splat, composite);
        assert!(matches!(
            *mgr[composite].kind(),
            ValueKind::Splat { count: 4, .. }
        ));
        for i in 0..4 {
            assert_eq!(mgr.index(splat, i), Some(e));
        }
        assert_eq!(mgr.index(splat, 4), None);
    }

    #[test]
    fn splat_hash_matches_explicit_elements() {
        let mut mgr = Manager::new();
        let vec3 = mgr.types.vec(Scalar::F32, VectorSize::Tri);
        let one = mgr.f32(1.0);
        let two = mgr.f32(2.0);
        let splat = mgr.splat(vec3, one, 3);
        let mixed = mgr.composite(vec3, vec![one, two, one]);

        let mut hasher = fxhash::FxHasher64::default();
        hash::Hash::hash(&vec3, &mut hasher);
        for _ in 0..3 {
            hasher.write_u64(mgr[one].structural_hash());
        }
        assert_eq!(mgr[splat].structural_hash(), hasher.finish());
        assert_ne!(mgr[splat].structural_hash(), mgr[mixed].structural_hash());
    }

    #[test]
    fn zero_flags() {
        let mut mgr = Manager::new();
        let vec2 = mgr.types.vec(Scalar::U32, VectorSize::Bi);
        let zero = mgr.u32(0);
        let one = mgr.u32(1);
        let mixed = mgr.composite(vec2, vec![zero, one]);
        assert!(!mgr[mixed].all_zero());
        assert!(mgr[mixed].any_zero());
        let z = mgr.zero(vec2);
        assert!(mgr[z].all_zero());
        let ones = mgr.splat(vec2, one, 2);
        assert!(!mgr[ones].any_zero());
    }

    #[test]
    fn zero_values() {
        let mut mgr = Manager::new();
        let f32 = mgr.types.f32();
        let mat = mgr.types.mat(Scalar::F32, VectorSize::Bi, VectorSize::Tri);
        let arr = mgr.types.array(mat, 2);
        let s = mgr.types.structure(
            "S",
            vec![
                ty::StructMember {
                    name: "a".to_string(),
                    ty: f32,
                },
                ty::StructMember {
                    name: "m".to_string(),
                    ty: arr,
                },
            ],
        );
        let z = mgr.zero(s);
        assert!(mgr[z].all_zero());
        let m = mgr.index(z, 1).unwrap();
        let column = mgr.index(mgr.index(m, 1).unwrap(), 0).unwrap();
        assert_eq!(mgr.literals(column), vec![Literal::F32(0.0); 3]);
    }

    #[test]
    #[should_panic]
    fn composite_arity_is_checked() {
        let mut mgr = Manager::new();
        let vec3 = mgr.types.vec(Scalar::F32, VectorSize::Tri);
        let one = mgr.f32(1.0);
        mgr.composite(vec3, vec![one, one]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "splat element of type i32 does not match vec2<f32>")]
    fn splat_element_type_is_checked() {
        let mut mgr = Manager::new();
        let vec2 = mgr.types.vec(Scalar::F32, VectorSize::Bi);
        let one = mgr.i32(1);
        mgr.splat(vec2, one, 2);
    }
}
