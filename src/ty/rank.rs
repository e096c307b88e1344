//! Implicit conversion ranking and common-type selection.

use super::{Manager, Scalar, Type};
use crate::arena::Handle;

/// Rank of the automatic conversion from `from` to `to`, lower is preferred.
///
/// The identity conversion ranks `0`. Abstract floats prefer `f32` over `f16`;
/// abstract integers prefer `i32`, then `u32`, then staying abstract as a
/// float, then `f32`, then `f16`.
const fn scalar_rank(from: Scalar, to: Scalar) -> Option<u32> {
    use Scalar as Sc;

    match (from, to) {
        _ if from as u8 == to as u8 => Some(0),
        (Sc::AbstractFloat, Sc::F32) => Some(1),
        (Sc::AbstractFloat, Sc::F16) => Some(2),
        (Sc::AbstractInt, Sc::I32) => Some(3),
        (Sc::AbstractInt, Sc::U32) => Some(4),
        (Sc::AbstractInt, Sc::AbstractFloat) => Some(5),
        (Sc::AbstractInt, Sc::F32) => Some(6),
        (Sc::AbstractInt, Sc::F16) => Some(7),
        _ => None,
    }
}

impl Manager {
    /// Rank of the implicit conversion from `from` to `to`.
    ///
    /// Returns `None` when no implicit conversion exists. Composite types
    /// convert when their shapes agree, with the rank of their elements.
    pub fn conversion_rank(&self, from: Handle<Type>, to: Handle<Type>) -> Option<u32> {
        if from == to {
            return Some(0);
        }
        match (&self[from], &self[to]) {
            (&Type::Scalar(from), &Type::Scalar(to)) => scalar_rank(from, to),
            (
                &Type::Vector {
                    size: from_size,
                    scalar: from,
                },
                &Type::Vector {
                    size: to_size,
                    scalar: to,
                },
            ) if from_size == to_size => scalar_rank(from, to),
            (
                &Type::Matrix {
                    columns: from_columns,
                    rows: from_rows,
                    scalar: from,
                },
                &Type::Matrix {
                    columns: to_columns,
                    rows: to_rows,
                    scalar: to,
                },
            ) if from_columns == to_columns && from_rows == to_rows => scalar_rank(from, to),
            (
                &Type::Array {
                    base: from_base,
                    size: from_size,
                },
                &Type::Array {
                    base: to_base,
                    size: to_size,
                },
            ) if from_size == to_size => self.conversion_rank(from_base, to_base),
            _ => None,
        }
    }

    /// The type every one of `types` converts to, if there is one.
    ///
    /// Walks the list keeping a running candidate; a type that converts to the
    /// candidate is absorbed, a type the candidate converts to replaces it,
    /// and anything else means there is no common type.
    pub fn common(&self, types: &[Handle<Type>]) -> Option<Handle<Type>> {
        let (&first, rest) = types.split_first()?;
        let mut common = first;
        for &ty in rest {
            if ty == common || self.conversion_rank(ty, common).is_some() {
                continue;
            }
            if self.conversion_rank(common, ty).is_some() {
                common = ty;
                continue;
            }
            return None;
        }
        Some(common)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{StructMember, VectorSize};
    use super::*;

    fn lattice(types: &mut Manager) -> Vec<Handle<Type>> {
        let mut all = Vec::new();
        for scalar in Scalar::ALL {
            all.push(types.scalar(scalar));
            for size in VectorSize::ALL {
                all.push(types.vec(scalar, size));
            }
            if scalar.is_float() {
                all.push(types.mat(scalar, VectorSize::Bi, VectorSize::Tri));
            }
        }
        all
    }

    #[test]
    fn identity_is_cheapest() {
        let mut types = Manager::new();
        for ty in lattice(&mut types) {
            assert_eq!(types.conversion_rank(ty, ty), Some(0));
        }
    }

    #[test]
    fn abstract_preferences() {
        let mut types = Manager::new();
        let ai = types.abstract_int();
        let af = types.abstract_float();
        let i32 = types.i32();
        let u32 = types.u32();
        let f32 = types.f32();
        let f16 = types.f16();
        let rank = |to| types.conversion_rank(ai, to).unwrap();
        assert!(rank(i32) < rank(u32));
        assert!(rank(u32) < rank(af));
        assert!(rank(af) < rank(f32));
        assert!(rank(f32) < rank(f16));
        assert!(types.conversion_rank(af, f32) < types.conversion_rank(af, f16));
        assert_eq!(types.conversion_rank(af, i32), None);
        assert_eq!(types.conversion_rank(i32, u32), None);
        assert_eq!(types.conversion_rank(f32, af), None);
    }

    #[test]
    fn conversions_compose() {
        let mut types = Manager::new();
        let all = lattice(&mut types);
        for &a in all.iter() {
            for &b in all.iter() {
                if types.conversion_rank(a, b).is_none() {
                    continue;
                }
                for &c in all.iter() {
                    if types.conversion_rank(b, c).is_some() {
                        assert!(
                            types.conversion_rank(a, c).is_some(),
                            "{} -> {} -> {}",
                            types.name(a),
                            types.name(b),
                            types.name(c)
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn common_type() {
        let mut types = Manager::new();
        let ai = types.abstract_int();
        let af = types.abstract_float();
        let f32 = types.f32();
        let i32 = types.i32();
        assert_eq!(types.common(&[ai, af, f32]), Some(f32));
        assert_eq!(types.common(&[f32, af, ai]), Some(f32));
        assert_eq!(types.common(&[ai, af]), Some(af));
        assert_eq!(types.common(&[ai]), Some(ai));
        assert_eq!(types.common(&[i32, f32]), None);
        assert_eq!(types.common(&[]), None);
    }

    #[test]
    fn no_common_struct() {
        let mut types = Manager::new();
        let f32 = types.f32();
        let a = types.structure(
            "A",
            vec![StructMember {
                name: "x".to_string(),
                ty: f32,
            }],
        );
        let b = types.structure(
            "B",
            vec![StructMember {
                name: "x".to_string(),
                ty: f32,
            }],
        );
        assert_eq!(types.common(&[a, b]), None);
        assert_eq!(types.common(&[a, a]), Some(a));
    }

    #[test]
    fn arrays_convert_elementwise() {
        let mut types = Manager::new();
        let ai = types.abstract_int();
        let u32 = types.u32();
        let from = types.array(ai, 3);
        let to = types.array(u32, 3);
        let other = types.array(u32, 4);
        assert_eq!(types.conversion_rank(from, to), Some(4));
        assert_eq!(types.conversion_rank(from, other), None);
    }
}
