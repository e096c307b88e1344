/*! Shader types.

Every [`Type`] lives in a [`Manager`], which interns them: two structurally
equal types always have the same [`Handle`], so handle comparison is type
comparison.
*/

mod rank;

use crate::arena::{Handle, UniqueArena};

use std::{fmt, ops};

/// Primitive scalar types.
#[derive(Clone, Copy, Debug, Hash, Eq, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum Scalar {
    Bool,
    I32,
    U32,
    F32,
    F16,
    /// An integer literal whose concrete type has not been decided yet.
    AbstractInt,
    /// A floating-point literal whose concrete type has not been decided yet.
    AbstractFloat,
}

impl Scalar {
    pub const ALL: [Self; 7] = [
        Self::Bool,
        Self::I32,
        Self::U32,
        Self::F32,
        Self::F16,
        Self::AbstractInt,
        Self::AbstractFloat,
    ];

    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F16 | Self::AbstractFloat)
    }

    pub const fn is_integer(self) -> bool {
        matches!(self, Self::I32 | Self::U32 | Self::AbstractInt)
    }

    pub const fn is_signed_integer(self) -> bool {
        matches!(self, Self::I32 | Self::AbstractInt)
    }

    pub const fn is_abstract(self) -> bool {
        matches!(self, Self::AbstractInt | Self::AbstractFloat)
    }

    /// Number of bits in the representation of a value of this type.
    pub const fn bit_width(self) -> u32 {
        match self {
            Self::Bool => 1,
            Self::F16 => 16,
            Self::I32 | Self::U32 | Self::F32 => 32,
            Self::AbstractInt | Self::AbstractFloat => 64,
        }
    }

    /// The concrete type an abstract scalar materializes to.
    pub const fn concrete(self) -> Self {
        match self {
            Self::AbstractInt => Self::I32,
            Self::AbstractFloat => Self::F32,
            other => other,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::AbstractInt => "abstract-int",
            Self::AbstractFloat => "abstract-float",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Number of components in a vector, or columns and rows in a matrix.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Hash, Eq, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum VectorSize {
    /// 2D vector
    Bi = 2,
    /// 3D vector
    Tri = 3,
    /// 4D vector
    Quad = 4,
}

impl VectorSize {
    pub const ALL: [Self; 3] = [Self::Bi, Self::Tri, Self::Quad];
}

impl From<VectorSize> for usize {
    fn from(size: VectorSize) -> usize {
        size as u8 as usize
    }
}

/// Size of an array.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ArraySize {
    /// The array size is known at shader creation time.
    Constant(u32),
    /// The array size can change at runtime.
    Runtime,
}

/// The number of dimensions an image has.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ImageDimension {
    D1,
    D2,
    D3,
    Cube,
}

/// Member of a user-defined structure.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct StructMember {
    pub name: String,
    pub ty: Handle<Type>,
}

/// A data type declared in the module.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Type {
    Scalar(Scalar),
    Vector {
        size: VectorSize,
        scalar: Scalar,
    },
    /// Matrix of columns by rows, stored as a list of column vectors.
    Matrix {
        columns: VectorSize,
        rows: VectorSize,
        scalar: Scalar,
    },
    Array {
        base: Handle<Type>,
        size: ArraySize,
    },
    Struct {
        name: String,
        members: Vec<StructMember>,
    },
    SampledTexture {
        dim: ImageDimension,
        sampled: Scalar,
    },
    Sampler,
}

impl Type {
    /// The scalar at the bottom of a scalar, vector or matrix type.
    pub const fn scalar(&self) -> Option<Scalar> {
        match *self {
            Self::Scalar(scalar)
            | Self::Vector { scalar, .. }
            | Self::Matrix { scalar, .. } => Some(scalar),
            _ => None,
        }
    }

    pub const fn vector_size(&self) -> Option<VectorSize> {
        match *self {
            Self::Vector { size, .. } => Some(size),
            _ => None,
        }
    }

    pub const fn is_scalar(&self) -> bool {
        matches!(*self, Self::Scalar(_))
    }

    pub fn is_signed_integer_scalar_or_vector(&self) -> bool {
        match *self {
            Self::Scalar(scalar) | Self::Vector { scalar, .. } => {
                scalar == Scalar::I32 || scalar == Scalar::AbstractInt
            }
            _ => false,
        }
    }

    pub fn is_integer_scalar_or_vector(&self) -> bool {
        match *self {
            Self::Scalar(scalar) | Self::Vector { scalar, .. } => scalar.is_integer(),
            _ => false,
        }
    }

    pub fn is_float_scalar_or_vector(&self) -> bool {
        match *self {
            Self::Scalar(scalar) | Self::Vector { scalar, .. } => scalar.is_float(),
            _ => false,
        }
    }
}

/// The interning table for every [`Type`] of a compilation.
#[derive(Debug, Default)]
pub struct Manager {
    types: UniqueArena<Type>,
}

impl ops::Index<Handle<Type>> for Manager {
    type Output = Type;
    fn index(&self, handle: Handle<Type>) -> &Type {
        &self.types[handle]
    }
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Intern `ty`, returning the unique handle for it.
    pub fn get(&mut self, ty: Type) -> Handle<Type> {
        self.types.insert(ty)
    }

    /// Look up `ty` without interning it.
    pub fn find(&self, ty: &Type) -> Option<Handle<Type>> {
        self.types.get(ty)
    }

    pub fn scalar(&mut self, scalar: Scalar) -> Handle<Type> {
        self.get(Type::Scalar(scalar))
    }

    pub fn bool(&mut self) -> Handle<Type> {
        self.scalar(Scalar::Bool)
    }

    pub fn i32(&mut self) -> Handle<Type> {
        self.scalar(Scalar::I32)
    }

    pub fn u32(&mut self) -> Handle<Type> {
        self.scalar(Scalar::U32)
    }

    pub fn f32(&mut self) -> Handle<Type> {
        self.scalar(Scalar::F32)
    }

    pub fn f16(&mut self) -> Handle<Type> {
        self.scalar(Scalar::F16)
    }

    pub fn abstract_int(&mut self) -> Handle<Type> {
        self.scalar(Scalar::AbstractInt)
    }

    pub fn abstract_float(&mut self) -> Handle<Type> {
        self.scalar(Scalar::AbstractFloat)
    }

    pub fn vec(&mut self, scalar: Scalar, size: VectorSize) -> Handle<Type> {
        self.get(Type::Vector { size, scalar })
    }

    pub fn mat(&mut self, scalar: Scalar, columns: VectorSize, rows: VectorSize) -> Handle<Type> {
        self.get(Type::Matrix {
            columns,
            rows,
            scalar,
        })
    }

    pub fn array(&mut self, base: Handle<Type>, count: u32) -> Handle<Type> {
        self.get(Type::Array {
            base,
            size: ArraySize::Constant(count),
        })
    }

    pub fn runtime_array(&mut self, base: Handle<Type>) -> Handle<Type> {
        self.get(Type::Array {
            base,
            size: ArraySize::Runtime,
        })
    }

    pub fn structure(&mut self, name: &str, members: Vec<StructMember>) -> Handle<Type> {
        self.get(Type::Struct {
            name: name.to_string(),
            members,
        })
    }

    pub fn sampled_texture(&mut self, dim: ImageDimension, sampled: Scalar) -> Handle<Type> {
        self.get(Type::SampledTexture { dim, sampled })
    }

    pub fn sampler(&mut self) -> Handle<Type> {
        self.get(Type::Sampler)
    }

    /// Return a type with element type `scalar` and the vector width of `shape`.
    ///
    /// If `shape` is not a vector, this is just the scalar type.
    pub fn match_width(&mut self, scalar: Scalar, shape: Handle<Type>) -> Handle<Type> {
        match self[shape] {
            Type::Vector { size, .. } => self.vec(scalar, size),
            _ => self.scalar(scalar),
        }
    }

    /// Number of elements of a composite type.
    ///
    /// Returns `None` for scalars, runtime-sized arrays and opaque types.
    pub fn element_count(&self, ty: Handle<Type>) -> Option<usize> {
        match self[ty] {
            Type::Vector { size, .. } => Some(size.into()),
            Type::Matrix { columns, .. } => Some(columns.into()),
            Type::Array {
                size: ArraySize::Constant(count),
                ..
            } => Some(count as usize),
            Type::Struct { ref members, .. } => Some(members.len()),
            _ => None,
        }
    }

    /// The type of element `index` of the composite type `ty`.
    pub fn element(&mut self, ty: Handle<Type>, index: usize) -> Option<Handle<Type>> {
        match self[ty] {
            Type::Vector { scalar, .. } => Some(self.scalar(scalar)),
            Type::Matrix { rows, scalar, .. } => Some(self.vec(scalar, rows)),
            Type::Array { base, .. } => Some(base),
            Type::Struct { ref members, .. } => members.get(index).map(|m| m.ty),
            _ => None,
        }
    }

    /// The innermost element type of `ty`: the scalar of vectors and matrices,
    /// the deepest element of arrays, `ty` itself otherwise.
    pub fn deepest_element(&mut self, ty: Handle<Type>) -> Handle<Type> {
        match self[ty] {
            Type::Vector { scalar, .. } | Type::Matrix { scalar, .. } => self.scalar(scalar),
            Type::Array { base, .. } => self.deepest_element(base),
            _ => ty,
        }
    }

    /// Replace every abstract scalar in `ty` with its concrete default.
    pub fn concrete(&mut self, ty: Handle<Type>) -> Handle<Type> {
        match self[ty].clone() {
            Type::Scalar(scalar) => self.scalar(scalar.concrete()),
            Type::Vector { size, scalar } => self.vec(scalar.concrete(), size),
            Type::Matrix {
                columns,
                rows,
                scalar,
            } => self.mat(scalar.concrete(), columns, rows),
            Type::Array { base, size } => {
                let base = self.concrete(base);
                self.get(Type::Array { base, size })
            }
            _ => ty,
        }
    }

    /// The WGSL spelling of `ty`, for diagnostics.
    pub fn name(&self, ty: Handle<Type>) -> String {
        match self[ty] {
            Type::Scalar(scalar) => scalar.name().to_string(),
            Type::Vector { size, scalar } => format!("vec{}<{}>", size as u8, scalar),
            Type::Matrix {
                columns,
                rows,
                scalar,
            } => format!("mat{}x{}<{}>", columns as u8, rows as u8, scalar),
            Type::Array {
                base,
                size: ArraySize::Constant(count),
            } => format!("array<{}, {}>", self.name(base), count),
            Type::Array {
                base,
                size: ArraySize::Runtime,
            } => format!("array<{}>", self.name(base)),
            Type::Struct { ref name, .. } => name.clone(),
            Type::SampledTexture { dim, sampled } => {
                let dim = match dim {
                    ImageDimension::D1 => "1d",
                    ImageDimension::D2 => "2d",
                    ImageDimension::D3 => "3d",
                    ImageDimension::Cube => "cube",
                };
                format!("texture_{dim}<{sampled}>")
            }
            Type::Sampler => "sampler".to_string(),
        }
    }
}
