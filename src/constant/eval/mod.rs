/*! Compile-time evaluation of WGSL expressions.

[`Eval`] folds operators, constructors, conversions and builtin calls whose
arguments are constant [`Value`]s into new constant values. Every entry point
returns an [`EvalResult`]:

- `Ok(Some(value))`: the expression is a constant.
- `Ok(None)`: some argument is only known at runtime, so the expression is too.
- `Err(Failure)`: the expression cannot be evaluated. Exactly one diagnostic
  explaining why has been added to the [`diag::List`].

With [`Eval::with_runtime_semantics`] the numeric problems that would be
errors are reported as warnings instead, and evaluation continues with the
value the hardware would produce.
*/

use super::number::Number;
use super::{KernelResult, Literal, Manager, Value, ValueKind};
use crate::ty::{Scalar, Type};
use crate::{diag, BuiltinFn, Handle, Span};

use smallvec::SmallVec;
use std::cmp::Ordering;

/// Run `$body` with `$N` aliased to the Rust type of the numeric scalar.
macro_rules! with_number {
    ($scalar:expr, $N:ident => $body:expr) => {
        match $scalar {
            Scalar::I32 => {
                type $N = i32;
                $body
            }
            Scalar::U32 => {
                type $N = u32;
                $body
            }
            Scalar::F32 => {
                type $N = f32;
                $body
            }
            Scalar::F16 => {
                type $N = half::f16;
                $body
            }
            Scalar::AbstractInt => {
                type $N = i64;
                $body
            }
            Scalar::AbstractFloat => {
                type $N = f64;
                $body
            }
            Scalar::Bool => unreachable!("bool is not a number"),
        }
    };
}

/// Run `$body` with `$F` aliased to the Rust type of the float scalar.
macro_rules! with_float {
    ($scalar:expr, $F:ident => $body:expr) => {
        match $scalar {
            Scalar::F32 => {
                type $F = f32;
                $body
            }
            Scalar::F16 => {
                type $F = half::f16;
                $body
            }
            Scalar::AbstractFloat => {
                type $F = f64;
                $body
            }
            other => unreachable!("{} is not a float", other),
        }
    };
}

mod builtins;

/// The error of an expression that failed to evaluate.
///
/// The diagnostic explaining the failure has already been reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("constant evaluation failed")]
pub struct Failure;

pub type EvalResult = Result<Option<Handle<Value>>, Failure>;

/// An operation [`Eval::evaluate`] can fold.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Function {
    /// Value conversion to the result type.
    Conv,
    /// The zero value of the result type.
    Zero,
    /// The argument itself.
    Identity,
    /// A vector whose every component is the argument.
    VecSplat,
    /// A vector from its scalar components.
    VecInitS,
    /// A vector from a mix of scalars and smaller vectors.
    VecInitM,
    /// A matrix from its scalar components, in column-major order.
    MatInitS,
    /// A matrix from its column vectors.
    MatInitV,
    ArrayOrStructInit,

    Complement,
    UnaryMinus,
    Not,

    Plus,
    Minus,
    Multiply,
    MultiplyMatVec,
    MultiplyVecMat,
    MultiplyMatMat,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanEqual,
    GreaterThanEqual,
    LogicalAnd,
    LogicalOr,
    And,
    Or,
    Xor,
    ShiftLeft,
    ShiftRight,

    Builtin(BuiltinFn),
}

impl Function {
    /// Number of arguments, or `None` for constructors taking any number.
    pub const fn argument_count(self) -> Option<usize> {
        match self {
            Self::Zero => Some(0),
            Self::Conv | Self::Identity | Self::VecSplat => Some(1),
            Self::VecInitS
            | Self::VecInitM
            | Self::MatInitS
            | Self::MatInitV
            | Self::ArrayOrStructInit => None,
            Self::Complement | Self::UnaryMinus | Self::Not => Some(1),
            Self::Builtin(fun) => Some(fun.argument_count()),
            _ => Some(2),
        }
    }
}

/// Constant expression evaluator.
///
/// Holds the value table new constants are interned into and the diagnostic
/// sink failures are reported to.
pub struct Eval<'a> {
    pub(super) mgr: &'a mut Manager,
    pub(super) diagnostics: &'a mut diag::List,
    pub(super) use_runtime_semantics: bool,
}

type Transform<'f, 'a> = dyn FnMut(&mut Eval<'a>, &[Literal]) -> KernelResult<Literal> + 'f;

fn number<N: Number>(literal: Literal) -> N {
    match N::from_literal(literal) {
        Some(n) => n,
        None => unreachable!("{:?} is not {}", literal, N::SCALAR),
    }
}

fn numbers<N: Number>(literals: &[Literal]) -> SmallVec<[N; 4]> {
    literals.iter().map(|&l| number(l)).collect()
}

fn compare(a: Literal, b: Literal) -> Option<Ordering> {
    match (a, b) {
        (Literal::Bool(a), Literal::Bool(b)) => a.partial_cmp(&b),
        (Literal::F32(a), Literal::F32(b)) => a.partial_cmp(&b),
        (Literal::F16(a), Literal::F16(b)) => a.partial_cmp(&b),
        (Literal::AbstractFloat(a), Literal::AbstractFloat(b)) => a.partial_cmp(&b),
        _ => match (a.as_integer(), b.as_integer()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => unreachable!("cannot compare {:?} with {:?}", a, b),
        },
    }
}

macro_rules! bitwise {
    ($a:expr, $b:expr, $op:tt) => {
        match ($a, $b) {
            (Literal::Bool(a), Literal::Bool(b)) => Literal::Bool(a $op b),
            (Literal::I32(a), Literal::I32(b)) => Literal::I32(a $op b),
            (Literal::U32(a), Literal::U32(b)) => Literal::U32(a $op b),
            (Literal::AbstractInt(a), Literal::AbstractInt(b)) => Literal::AbstractInt(a $op b),
            (a, b) => unreachable!("bitwise operands {:?} and {:?}", a, b),
        }
    };
}

impl<'a> Eval<'a> {
    /// An evaluator with compile-time semantics: numeric problems are errors.
    pub fn new(mgr: &'a mut Manager, diagnostics: &'a mut diag::List) -> Self {
        Eval {
            mgr,
            diagnostics,
            use_runtime_semantics: false,
        }
    }

    /// An evaluator with runtime semantics: numeric problems are warnings,
    /// and evaluation continues with a substitute value.
    pub fn with_runtime_semantics(mgr: &'a mut Manager, diagnostics: &'a mut diag::List) -> Self {
        Eval {
            mgr,
            diagnostics,
            use_runtime_semantics: true,
        }
    }

    pub fn manager(&mut self) -> &mut Manager {
        &mut *self.mgr
    }

    /// Evaluate `function` for the given arguments, producing a value of type `ty`.
    ///
    /// `None` arguments are not constant; the result is then not constant
    /// either.
    ///
    /// # Panics
    ///
    /// If the argument count or types do not suit `function`. Type checking is
    /// the caller's job.
    pub fn evaluate(
        &mut self,
        function: Function,
        ty: Handle<Type>,
        args: &[Option<Handle<Value>>],
        span: Span,
    ) -> EvalResult {
        log::trace!("evaluate {:?} -> {}", function, self.mgr.types.name(ty));
        if let Some(count) = function.argument_count() {
            assert_eq!(args.len(), count, "wrong number of arguments to {function:?}");
        }
        let args: SmallVec<[Handle<Value>; 4]> = match args.iter().copied().collect() {
            Some(args) => args,
            None => {
                log::debug!("{:?} has a runtime argument", function);
                return Ok(None);
            }
        };

        match function {
            Function::Conv => self.convert(ty, args[0], span),
            Function::Zero => Ok(Some(self.mgr.zero(ty))),
            Function::Identity => Ok(Some(args[0])),
            Function::VecSplat => self.vec_splat(ty, args[0]),
            Function::VecInitS | Function::MatInitV => Ok(Some(self.mgr.composite(ty, args.to_vec()))),
            Function::VecInitM => self.vec_init_mixed(ty, &args),
            Function::MatInitS => self.mat_init_scalars(ty, &args),
            Function::ArrayOrStructInit => self.array_or_struct_init(ty, &args),

            Function::Complement => self.complement(ty, &args),
            Function::UnaryMinus => self.unary_minus(ty, &args, span),
            Function::Not => self.transform(ty, &args, &mut |_, l| match l[0] {
                Literal::Bool(v) => Ok(Literal::Bool(!v)),
                other => unreachable!("logical negation of {:?}", other),
            }),

            Function::Plus => self.transform(ty, &args, &mut |this, l| {
                with_number!(l[0].scalar(), N => this
                    .add(span, number::<N>(l[0]), number::<N>(l[1]))
                    .map(Number::into_literal))
            }),
            Function::Minus => self.transform(ty, &args, &mut |this, l| {
                with_number!(l[0].scalar(), N => this
                    .sub(span, number::<N>(l[0]), number::<N>(l[1]))
                    .map(Number::into_literal))
            }),
            Function::Multiply => self.transform(ty, &args, &mut |this, l| {
                with_number!(l[0].scalar(), N => this
                    .mul(span, number::<N>(l[0]), number::<N>(l[1]))
                    .map(Number::into_literal))
            }),
            Function::Divide => self.transform(ty, &args, &mut |this, l| {
                with_number!(l[0].scalar(), N => this
                    .div(span, number::<N>(l[0]), number::<N>(l[1]))
                    .map(Number::into_literal))
            }),
            Function::Modulo => self.transform(ty, &args, &mut |this, l| {
                with_number!(l[0].scalar(), N => this
                    .rem(span, number::<N>(l[0]), number::<N>(l[1]))
                    .map(Number::into_literal))
            }),
            Function::MultiplyMatVec => self.multiply_mat_vec(ty, args[0], args[1], span),
            Function::MultiplyVecMat => self.multiply_vec_mat(ty, args[0], args[1], span),
            Function::MultiplyMatMat => self.multiply_mat_mat(ty, args[0], args[1], span),

            Function::Equal => self.comparison(ty, &args, |o| o == Some(Ordering::Equal)),
            Function::NotEqual => self.comparison(ty, &args, |o| o != Some(Ordering::Equal)),
            Function::LessThan => self.comparison(ty, &args, |o| o == Some(Ordering::Less)),
            Function::GreaterThan => self.comparison(ty, &args, |o| o == Some(Ordering::Greater)),
            Function::LessThanEqual => self.comparison(ty, &args, |o| {
                matches!(o, Some(Ordering::Less | Ordering::Equal))
            }),
            Function::GreaterThanEqual => self.comparison(ty, &args, |o| {
                matches!(o, Some(Ordering::Greater | Ordering::Equal))
            }),

            Function::LogicalAnd => self.transform(ty, &args, &mut |_, l| match (l[0], l[1]) {
                (Literal::Bool(a), Literal::Bool(b)) => Ok(Literal::Bool(a && b)),
                (a, b) => unreachable!("logical and of {:?} and {:?}", a, b),
            }),
            Function::LogicalOr => self.transform(ty, &args, &mut |_, l| match (l[0], l[1]) {
                (Literal::Bool(a), Literal::Bool(b)) => Ok(Literal::Bool(a || b)),
                (a, b) => unreachable!("logical or of {:?} and {:?}", a, b),
            }),
            Function::And => self.transform(ty, &args, &mut |_, l| Ok(bitwise!(l[0], l[1], &))),
            Function::Or => self.transform(ty, &args, &mut |_, l| Ok(bitwise!(l[0], l[1], |))),
            Function::Xor => self.transform(ty, &args, &mut |_, l| Ok(bitwise!(l[0], l[1], ^))),
            Function::ShiftLeft => self.shift(ty, &args, true),
            Function::ShiftRight => self.shift(ty, &args, false),

            Function::Builtin(fun) => self.builtin(fun, ty, &args, span),
        }
    }

    fn literal(&self, value: Handle<Value>) -> Literal {
        match self.mgr.literal(value) {
            Some(literal) => literal,
            None => unreachable!("{:?} is not a scalar", value),
        }
    }

    fn element_type(&mut self, ty: Handle<Type>, index: usize) -> Handle<Type> {
        match self.mgr.types.element(ty, index) {
            Some(element) => element,
            None => unreachable!("{} has no element {}", self.mgr.types.name(ty), index),
        }
    }

    /// Build a value of type `ty` by applying `f` to each scalar of `args`.
    ///
    /// Scalar arguments are used for every element when `ty` is a composite.
    /// Stops at the first element that fails.
    fn transform_elements(
        &mut self,
        ty: Handle<Type>,
        args: &[Handle<Value>],
        f: &mut Transform<'_, 'a>,
    ) -> KernelResult<Handle<Value>> {
        let count = match self.mgr.types.element_count(ty) {
            Some(count) => count,
            None => {
                let literals: SmallVec<[Literal; 4]> =
                    args.iter().map(|&arg| self.literal(arg)).collect();
                let result = f(self, &literals)?;
                return Ok(self.mgr.scalar(result));
            }
        };

        let uniform = !matches!(self.mgr.types[ty], Type::Struct { .. })
            && args.iter().all(|&arg| {
                matches!(
                    *self.mgr[arg].kind(),
                    ValueKind::Scalar(_) | ValueKind::Splat { .. }
                )
            });
        let element_count = if uniform { 1 } else { count };

        let mut elements = Vec::with_capacity(element_count);
        for index in 0..element_count {
            let element_ty = self.element_type(ty, index);
            let element_args: SmallVec<[Handle<Value>; 4]> = args
                .iter()
                .map(|&arg| self.mgr.index(arg, index).unwrap_or(arg))
                .collect();
            elements.push(self.transform_elements(element_ty, &element_args, f)?);
        }
        if uniform {
            Ok(self.mgr.splat(ty, elements[0], count as u32))
        } else {
            Ok(self.mgr.composite(ty, elements))
        }
    }

    fn transform(&mut self, ty: Handle<Type>, args: &[Handle<Value>], f: &mut Transform<'_, 'a>) -> EvalResult {
        self.transform_elements(ty, args, f).map(Some)
    }

    /// Convert `value` to the type `ty`, element by element.
    pub fn convert(&mut self, ty: Handle<Type>, value: Handle<Value>, span: Span) -> EvalResult {
        if self.mgr.ty(value) == ty {
            return Ok(Some(value));
        }
        let target = self.mgr.types.deepest_element(ty);
        let scalar = match self.mgr.types[target] {
            Type::Scalar(scalar) => scalar,
            _ => unreachable!("cannot convert to {}", self.mgr.types.name(ty)),
        };
        self.transform(ty, &[value], &mut |this, l| this.convert_literal(l[0], scalar, span))
    }

    fn conversion_failure(&mut self, literal: Literal, to: Scalar, span: Span, substitute: Literal) -> KernelResult<Literal> {
        let message = format!("value {literal} cannot be represented as '{to}'");
        self.recover(message, span, substitute)
    }

    fn convert_literal(&mut self, literal: Literal, to: Scalar, span: Span) -> KernelResult<Literal> {
        use Literal as L;

        #[derive(Clone, Copy)]
        enum Source {
            Int(i64),
            Float(f64),
        }

        let source = match literal {
            _ if literal.scalar() == to => return Ok(literal),
            L::Bool(v) => {
                return Ok(if v { Literal::one(to) } else { Literal::zero(to) });
            }
            L::I32(v) => Source::Int(v.into()),
            L::U32(v) => Source::Int(v.into()),
            L::AbstractInt(v) => Source::Int(v),
            L::F32(v) => Source::Float(v.into()),
            L::F16(v) => Source::Float(v.to_f64()),
            L::AbstractFloat(v) => Source::Float(v),
        };

        // concrete integers of the same width convert bit for bit
        match (literal, to) {
            (L::U32(v), Scalar::I32) => return Ok(L::I32(v as i32)),
            (L::I32(v), Scalar::U32) => return Ok(L::U32(v as u32)),
            _ => {}
        }

        Ok(match (to, source) {
            (Scalar::Bool, Source::Int(v)) => L::Bool(v != 0),
            (Scalar::Bool, Source::Float(v)) => L::Bool(v != 0.0),
            (Scalar::I32, Source::Int(v)) => match i32::try_from(v) {
                Ok(v) => L::I32(v),
                Err(_) => {
                    let saturated = v.clamp(i32::MIN.into(), i32::MAX.into()) as i32;
                    self.conversion_failure(literal, to, span, L::I32(saturated))?
                }
            },
            (Scalar::U32, Source::Int(v)) => match u32::try_from(v) {
                Ok(v) => L::U32(v),
                Err(_) => {
                    let saturated = v.clamp(0, u32::MAX.into()) as u32;
                    self.conversion_failure(literal, to, span, L::U32(saturated))?
                }
            },
            // floats truncate toward zero and clamp to the integer range, NaN gives 0
            (Scalar::I32, Source::Float(v)) => L::I32(v as i32),
            (Scalar::U32, Source::Float(v)) => L::U32(v as u32),
            (Scalar::AbstractInt, Source::Int(v)) => L::AbstractInt(v),
            (Scalar::AbstractInt, Source::Float(v)) => {
                let t = v.trunc();
                if t >= i64::MIN as f64 && t < i64::MAX as f64 {
                    L::AbstractInt(t as i64)
                } else {
                    self.conversion_failure(literal, to, span, L::AbstractInt(v as i64))?
                }
            }
            (Scalar::F32 | Scalar::F16 | Scalar::AbstractFloat, source) => {
                let v = match source {
                    Source::Int(v) => v as f64,
                    Source::Float(v) => v,
                };
                let converted = with_float!(to, F => <F as super::number::Float>::from_f64(v).map(Number::into_literal));
                match converted {
                    Some(literal) => literal,
                    None => self.conversion_failure(literal, to, span, Literal::zero(to))?,
                }
            }
        })
    }

    /// Reinterpret the bits of `value` as the type `ty`.
    ///
    /// Supports scalars and vectors of 32-bit types, and `f16` vectors of the
    /// same total width.
    pub fn bitcast(&mut self, ty: Handle<Type>, value: Handle<Value>, span: Span) -> EvalResult {
        let from = self.mgr.ty(value);
        let mut bytes = SmallVec::<[u8; 16]>::new();
        for literal in self.mgr.literals(value) {
            match literal {
                Literal::I32(v) => bytes.extend_from_slice(&v.to_le_bytes()),
                Literal::U32(v) => bytes.extend_from_slice(&v.to_le_bytes()),
                Literal::F32(v) => bytes.extend_from_slice(&v.to_bits().to_le_bytes()),
                Literal::F16(v) => bytes.extend_from_slice(&v.to_bits().to_le_bytes()),
                _ => return self.unsupported_bitcast(from, ty, span),
            }
        }

        let (scalar, count) = match self.mgr.types[ty] {
            Type::Scalar(scalar) => (scalar, 1),
            Type::Vector { size, scalar } => (scalar, usize::from(size)),
            _ => return self.unsupported_bitcast(from, ty, span),
        };
        let width = match scalar {
            Scalar::I32 | Scalar::U32 | Scalar::F32 => 4,
            Scalar::F16 => 2,
            _ => return self.unsupported_bitcast(from, ty, span),
        };
        if width * count != bytes.len() {
            return self.unsupported_bitcast(from, ty, span);
        }

        let mut elements = Vec::with_capacity(count);
        for chunk in bytes.chunks_exact(width) {
            let literal = match *chunk {
                [a, b, c, d] => {
                    let bits = u32::from_le_bytes([a, b, c, d]);
                    match scalar {
                        Scalar::I32 => Literal::I32(bits as i32),
                        Scalar::U32 => Literal::U32(bits),
                        _ => {
                            let v = f32::from_bits(bits);
                            if v.is_finite() {
                                Literal::F32(v)
                            } else {
                                let message = format!("value {v} cannot be represented as 'f32'");
                                self.recover(message, span, Literal::F32(0.0))?
                            }
                        }
                    }
                }
                [a, b] => {
                    let v = half::f16::from_bits(u16::from_le_bytes([a, b]));
                    if v.is_finite() {
                        Literal::F16(v)
                    } else {
                        let message = format!("value {v} cannot be represented as 'f16'");
                        self.recover(message, span, Literal::F16(half::f16::ZERO))?
                    }
                }
                _ => unreachable!(),
            };
            elements.push(self.mgr.scalar(literal));
        }

        Ok(Some(if count == 1 {
            elements[0]
        } else {
            self.mgr.composite(ty, elements)
        }))
    }

    fn unsupported_bitcast(&mut self, from: Handle<Type>, to: Handle<Type>, span: Span) -> EvalResult {
        let message = format!(
            "unsupported bitcast from '{}' to '{}'",
            self.mgr.types.name(from),
            self.mgr.types.name(to)
        );
        self.diagnostics.add_error(message, span);
        Err(Failure)
    }

    /// Element `index` of the composite `value`.
    ///
    /// An index out of bounds is an error regardless of semantics.
    pub fn index(&mut self, value: Handle<Value>, index: Handle<Value>, span: Span) -> EvalResult {
        let count = match self.mgr.element_count(value) {
            Some(count) => count,
            None => unreachable!("indexing the scalar {:?}", value),
        };
        let index = match self.literal(index).as_integer() {
            Some(index) => index,
            None => unreachable!("{:?} is not an integer index", index),
        };
        match usize::try_from(index).ok().and_then(|i| self.mgr.index(value, i)) {
            Some(element) => Ok(Some(element)),
            None => {
                let message = format!("index {} out of bounds [0..{}]", index, count.saturating_sub(1));
                self.diagnostics.add_error(message, span);
                Err(Failure)
            }
        }
    }

    /// Select the components `indices` of the vector `value`.
    ///
    /// A single index produces a scalar, several a vector of type `ty`.
    pub fn swizzle(&mut self, ty: Handle<Type>, value: Handle<Value>, indices: &[u32], span: Span) -> EvalResult {
        let count = self.mgr.element_count(value).unwrap_or(0);
        let mut elements = Vec::with_capacity(indices.len());
        for &index in indices {
            match self.mgr.index(value, index as usize) {
                Some(element) => elements.push(element),
                None => {
                    let message = format!(
                        "swizzle index {} out of bounds [0..{}]",
                        index,
                        count.saturating_sub(1)
                    );
                    self.diagnostics.add_error(message, span);
                    return Err(Failure);
                }
            }
        }
        Ok(Some(if elements.len() == 1 {
            elements[0]
        } else {
            self.mgr.composite(ty, elements)
        }))
    }

    fn vec_splat(&mut self, ty: Handle<Type>, element: Handle<Value>) -> EvalResult {
        let count = match self.mgr.types[ty] {
            Type::Vector { size, .. } => size as u32,
            _ => unreachable!("splatting to {}", self.mgr.types.name(ty)),
        };
        Ok(Some(self.mgr.splat(ty, element, count)))
    }

    fn vec_init_mixed(&mut self, ty: Handle<Type>, args: &[Handle<Value>]) -> EvalResult {
        let mut elements = Vec::new();
        for &arg in args {
            match self.mgr.element_count(arg) {
                Some(_) => elements.extend(self.mgr.elements(arg)),
                None => elements.push(arg),
            }
        }
        Ok(Some(self.mgr.composite(ty, elements)))
    }

    fn mat_init_scalars(&mut self, ty: Handle<Type>, args: &[Handle<Value>]) -> EvalResult {
        let (rows, scalar) = match self.mgr.types[ty] {
            Type::Matrix { rows, scalar, .. } => (rows, scalar),
            _ => unreachable!("{} is not a matrix", self.mgr.types.name(ty)),
        };
        let column_ty = self.mgr.types.vec(scalar, rows);
        let columns = args
            .chunks(usize::from(rows))
            .map(|column| self.mgr.composite(column_ty, column.to_vec()))
            .collect();
        Ok(Some(self.mgr.composite(ty, columns)))
    }

    fn array_or_struct_init(&mut self, ty: Handle<Type>, args: &[Handle<Value>]) -> EvalResult {
        if args.is_empty() {
            return Ok(Some(self.mgr.zero(ty)));
        }
        Ok(Some(self.mgr.composite(ty, args.to_vec())))
    }

    fn complement(&mut self, ty: Handle<Type>, args: &[Handle<Value>]) -> EvalResult {
        self.transform(ty, args, &mut |_, l| {
            Ok(match l[0] {
                Literal::I32(v) => Literal::I32(!v),
                Literal::U32(v) => Literal::U32(!v),
                Literal::AbstractInt(v) => Literal::AbstractInt(!v),
                other => unreachable!("complement of {:?}", other),
            })
        })
    }

    fn unary_minus(&mut self, ty: Handle<Type>, args: &[Handle<Value>], span: Span) -> EvalResult {
        self.transform(ty, args, &mut |this, l| {
            Ok(match l[0] {
                Literal::I32(v) => Literal::I32(v.wrapping_neg()),
                Literal::AbstractInt(v) => match v.checked_neg() {
                    Some(v) => Literal::AbstractInt(v),
                    None => {
                        let message = format!("'-{v}' cannot be represented as 'abstract-int'");
                        this.recover(message, span, Literal::AbstractInt(v))?
                    }
                },
                Literal::F32(v) => Literal::F32(-v),
                Literal::F16(v) => Literal::F16(-v),
                Literal::AbstractFloat(v) => Literal::AbstractFloat(-v),
                other => unreachable!("negation of {:?}", other),
            })
        })
    }

    fn comparison(
        &mut self,
        ty: Handle<Type>,
        args: &[Handle<Value>],
        test: fn(Option<Ordering>) -> bool,
    ) -> EvalResult {
        self.transform(ty, args, &mut |_, l| Ok(Literal::Bool(test(compare(l[0], l[1])))))
    }

    /// Shifts use the shift amount modulo the bit width of the shifted value.
    fn shift(&mut self, ty: Handle<Type>, args: &[Handle<Value>], left: bool) -> EvalResult {
        self.transform(ty, args, &mut |_, l| {
            let amount = match l[1].as_integer() {
                Some(amount) => amount as u64,
                None => unreachable!("shift by {:?}", l[1]),
            };
            let amount = (amount % u64::from(l[0].scalar().bit_width())) as u32;
            Ok(match (l[0], left) {
                (Literal::I32(v), true) => Literal::I32(v.wrapping_shl(amount)),
                (Literal::I32(v), false) => Literal::I32(v.wrapping_shr(amount)),
                (Literal::U32(v), true) => Literal::U32(v.wrapping_shl(amount)),
                (Literal::U32(v), false) => Literal::U32(v.wrapping_shr(amount)),
                (Literal::AbstractInt(v), true) => Literal::AbstractInt(v.wrapping_shl(amount)),
                (Literal::AbstractInt(v), false) => Literal::AbstractInt(v.wrapping_shr(amount)),
                (other, _) => unreachable!("shift of {:?}", other),
            })
        })
    }

    fn dot_literals(&mut self, a: &[Literal], b: &[Literal], span: Span) -> KernelResult<Literal> {
        with_number!(a[0].scalar(), N => self
            .dot(span, &numbers::<N>(a), &numbers::<N>(b))
            .map(Number::into_literal))
    }

    /// The scalars of every column of the matrix `value`.
    fn columns(&self, value: Handle<Value>) -> Vec<Vec<Literal>> {
        self.mgr
            .elements(value)
            .into_iter()
            .map(|column| self.mgr.literals(column))
            .collect()
    }

    fn multiply_mat_vec(&mut self, ty: Handle<Type>, mat: Handle<Value>, vec: Handle<Value>, span: Span) -> EvalResult {
        let columns = self.columns(mat);
        let vec = self.mgr.literals(vec);
        let mut elements = Vec::with_capacity(columns[0].len());
        for row in 0..columns[0].len() {
            let row: SmallVec<[Literal; 4]> = columns.iter().map(|column| column[row]).collect();
            let result = self.dot_literals(&row, &vec, span)?;
            elements.push(self.mgr.scalar(result));
        }
        Ok(Some(self.mgr.composite(ty, elements)))
    }

    fn multiply_vec_mat(&mut self, ty: Handle<Type>, vec: Handle<Value>, mat: Handle<Value>, span: Span) -> EvalResult {
        let columns = self.columns(mat);
        let vec = self.mgr.literals(vec);
        let mut elements = Vec::with_capacity(columns.len());
        for column in columns.iter() {
            let result = self.dot_literals(&vec, column, span)?;
            elements.push(self.mgr.scalar(result));
        }
        Ok(Some(self.mgr.composite(ty, elements)))
    }

    fn multiply_mat_mat(&mut self, ty: Handle<Type>, lhs: Handle<Value>, rhs: Handle<Value>, span: Span) -> EvalResult {
        let lhs = self.columns(lhs);
        let rhs = self.columns(rhs);
        let rows = lhs[0].len();
        let mut columns = Vec::with_capacity(rhs.len());
        for (index, rhs_column) in rhs.iter().enumerate() {
            let column_ty = self.element_type(ty, index);
            let mut elements = Vec::with_capacity(rows);
            for row in 0..rows {
                let lhs_row: SmallVec<[Literal; 4]> = lhs.iter().map(|column| column[row]).collect();
                let result = self.dot_literals(&lhs_row, rhs_column, span)?;
                elements.push(self.mgr.scalar(result));
            }
            columns.push(self.mgr.composite(column_ty, elements));
        }
        Ok(Some(self.mgr.composite(ty, columns)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Severity;
    use crate::ty::VectorSize;

    const SPAN: Span = Span::new(1, 5);

    #[test]
    fn runtime_arguments_are_not_constant() {
        let mut mgr = Manager::new();
        let mut diags = diag::List::new();
        let one = mgr.i32(1);
        let i32 = mgr.types.i32();
        let mut eval = Eval::new(&mut mgr, &mut diags);
        let result = eval.evaluate(Function::Plus, i32, &[Some(one), None], SPAN);
        assert_eq!(result, Ok(None));
        assert!(diags.is_empty());
    }

    #[test]
    fn vector_plus_scalar() {
        let mut mgr = Manager::new();
        let mut diags = diag::List::new();
        let vec3 = mgr.types.vec(Scalar::F32, VectorSize::Tri);
        let elements = vec![mgr.f32(1.0), mgr.f32(2.0), mgr.f32(3.0)];
        let v = mgr.composite(vec3, elements);
        let ten = mgr.f32(10.0);
        let mut eval = Eval::new(&mut mgr, &mut diags);
        let sum = eval
            .evaluate(Function::Plus, vec3, &[Some(v), Some(ten)], SPAN)
            .unwrap()
            .unwrap();
        assert_eq!(
            mgr.literals(sum),
            [Literal::F32(11.0), Literal::F32(12.0), Literal::F32(13.0)]
        );
    }

    #[test]
    fn splat_arithmetic_stays_splat() {
        let mut mgr = Manager::new();
        let mut diags = diag::List::new();
        let vec4 = mgr.types.vec(Scalar::U32, VectorSize::Quad);
        let two = mgr.u32(2);
        let three = mgr.u32(3);
        let a = mgr.splat(vec4, two, 4);
        let b = mgr.splat(vec4, three, 4);
        let mut eval = Eval::new(&mut mgr, &mut diags);
        let product = eval
            .evaluate(Function::Multiply, vec4, &[Some(a), Some(b)], SPAN)
            .unwrap()
            .unwrap();
        let six = mgr.u32(6);
        assert_eq!(*mgr[product].kind(), ValueKind::Splat { element: six, count: 4 });
    }

    #[test]
    fn conversions() {
        let mut mgr = Manager::new();
        let mut diags = diag::List::new();
        let i32 = mgr.types.i32();
        let u32 = mgr.types.u32();
        let f16 = mgr.types.f16();
        let boolean = mgr.types.bool();
        let big = mgr.abstract_int(1 << 40);
        let minus_one = mgr.i32(-1);
        let half = mgr.abstract_float(2.75);
        let f32_max = mgr.f32(f32::MAX);
        let below = mgr.f32(-1.0e10);
        let nan = mgr.f32(f32::NAN);
        let mut eval = Eval::new(&mut mgr, &mut diags);
        let clamped_high = eval.convert(i32, f32_max, SPAN).unwrap().unwrap();
        let clamped_low = eval.convert(u32, below, SPAN).unwrap().unwrap();
        let from_nan = eval.convert(i32, nan, SPAN).unwrap().unwrap();
        let all_ones = eval.convert(u32, minus_one, SPAN).unwrap().unwrap();
        let truncated = eval.convert(i32, half, SPAN).unwrap().unwrap();
        let truthy = eval.convert(boolean, half, SPAN).unwrap().unwrap();
        assert_eq!(eval.convert(i32, big, SPAN), Err(Failure));
        assert_eq!(eval.convert(f16, f32_max, SPAN), Err(Failure));
        assert_eq!(mgr.literal(all_ones), Some(Literal::U32(u32::MAX)));
        assert_eq!(mgr.literal(truncated), Some(Literal::I32(2)));
        assert_eq!(mgr.literal(truthy), Some(Literal::Bool(true)));
        assert_eq!(mgr.literal(clamped_high), Some(Literal::I32(i32::MAX)));
        assert_eq!(mgr.literal(clamped_low), Some(Literal::U32(0)));
        assert_eq!(mgr.literal(from_nan), Some(Literal::I32(0)));
        let messages: Vec<_> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(
            messages,
            [
                "value 1099511627776 cannot be represented as 'i32'",
                "value 3.4028235e38 cannot be represented as 'f16'",
            ]
        );
    }

    #[test]
    fn bitcasts() {
        let mut mgr = Manager::new();
        let mut diags = diag::List::new();
        let u32 = mgr.types.u32();
        let f32 = mgr.types.f32();
        let vec2h = mgr.types.vec(Scalar::F16, VectorSize::Bi);
        let vec3u = mgr.types.vec(Scalar::U32, VectorSize::Tri);
        let one = mgr.f32(1.0);
        let nan_bits = mgr.u32(0x7fc0_0000);
        let mut eval = Eval::new(&mut mgr, &mut diags);
        let bits = eval.bitcast(u32, one, SPAN).unwrap().unwrap();
        let halves = eval.bitcast(vec2h, bits, SPAN).unwrap().unwrap();
        assert_eq!(eval.bitcast(f32, nan_bits, SPAN), Err(Failure));
        assert_eq!(eval.bitcast(vec3u, one, SPAN), Err(Failure));
        assert_eq!(mgr.literal(bits), Some(Literal::U32(0x3f80_0000)));
        assert_eq!(
            mgr.literals(halves),
            [
                Literal::F16(half::f16::from_bits(0x0000)),
                Literal::F16(half::f16::from_bits(0x3f80)),
            ]
        );
        assert_eq!(
            diags.iter().last().map(|d| d.message.as_str()),
            Some("unsupported bitcast from 'f32' to 'vec3<u32>'")
        );
    }

    #[test]
    fn index_out_of_bounds_is_always_an_error() {
        let mut mgr = Manager::new();
        let mut diags = diag::List::new();
        let vec3 = mgr.types.vec(Scalar::I32, VectorSize::Tri);
        let elements = vec![mgr.i32(1), mgr.i32(2), mgr.i32(3)];
        let v = mgr.composite(vec3, elements);
        let one = mgr.u32(1);
        let five = mgr.i32(5);
        let negative = mgr.i32(-1);
        let mut eval = Eval::with_runtime_semantics(&mut mgr, &mut diags);
        let second = eval.index(v, one, SPAN).unwrap().unwrap();
        assert_eq!(eval.index(v, five, SPAN), Err(Failure));
        assert_eq!(eval.index(v, negative, SPAN), Err(Failure));
        assert_eq!(mgr.literal(second), Some(Literal::I32(2)));
        let messages: Vec<_> = diags.iter().map(|d| (d.severity, d.message.as_str())).collect();
        assert_eq!(
            messages,
            [
                (Severity::Error, "index 5 out of bounds [0..2]"),
                (Severity::Error, "index -1 out of bounds [0..2]"),
            ]
        );
    }

    #[test]
    fn swizzles() {
        let mut mgr = Manager::new();
        let mut diags = diag::List::new();
        let vec2 = mgr.types.vec(Scalar::F32, VectorSize::Bi);
        let vec3 = mgr.types.vec(Scalar::F32, VectorSize::Tri);
        let f32 = mgr.types.f32();
        let elements = vec![mgr.f32(1.0), mgr.f32(2.0)];
        let v = mgr.composite(vec2, elements);
        let mut eval = Eval::new(&mut mgr, &mut diags);
        let yxy = eval.swizzle(vec3, v, &[1, 0, 1], SPAN).unwrap().unwrap();
        let y = eval.swizzle(f32, v, &[1], SPAN).unwrap().unwrap();
        assert_eq!(eval.swizzle(vec3, v, &[0, 2, 1], SPAN), Err(Failure));
        assert_eq!(
            mgr.literals(yxy),
            [Literal::F32(2.0), Literal::F32(1.0), Literal::F32(2.0)]
        );
        assert_eq!(mgr.literal(y), Some(Literal::F32(2.0)));
        assert_eq!(
            diags.iter().next().map(|d| d.message.as_str()),
            Some("swizzle index 2 out of bounds [0..1]")
        );
    }

    #[test]
    fn shifts_wrap_amount() {
        let mut mgr = Manager::new();
        let mut diags = diag::List::new();
        let i32 = mgr.types.i32();
        let u32 = mgr.types.u32();
        let one = mgr.u32(1);
        let minus_eight = mgr.i32(-8);
        let thirty_three = mgr.u32(33);
        let mut eval = Eval::new(&mut mgr, &mut diags);
        let left = eval
            .evaluate(Function::ShiftLeft, u32, &[Some(one), Some(thirty_three)], SPAN)
            .unwrap()
            .unwrap();
        let right = eval
            .evaluate(Function::ShiftRight, i32, &[Some(minus_eight), Some(one)], SPAN)
            .unwrap()
            .unwrap();
        assert_eq!(mgr.literal(left), Some(Literal::U32(2)));
        assert_eq!(mgr.literal(right), Some(Literal::I32(-4)));
    }

    #[test]
    fn comparisons() {
        let mut mgr = Manager::new();
        let mut diags = diag::List::new();
        let boolean = mgr.types.bool();
        let nan = mgr.f32(f32::NAN);
        let zero = mgr.f32(0.0);
        let negative_zero = mgr.f32(-0.0);
        let mut eval = Eval::new(&mut mgr, &mut diags);
        let mut check = |function, a, b| {
            let result = eval.evaluate(function, boolean, &[Some(a), Some(b)], SPAN);
            result.unwrap().unwrap()
        };
        let zeros_equal = check(Function::Equal, zero, negative_zero);
        let nan_equal = check(Function::Equal, nan, nan);
        let nan_not_equal = check(Function::NotEqual, nan, nan);
        let nan_less = check(Function::LessThanEqual, nan, zero);
        assert_eq!(mgr.literal(zeros_equal), Some(Literal::Bool(true)));
        assert_eq!(mgr.literal(nan_equal), Some(Literal::Bool(false)));
        assert_eq!(mgr.literal(nan_not_equal), Some(Literal::Bool(true)));
        assert_eq!(mgr.literal(nan_less), Some(Literal::Bool(false)));
    }

    #[test]
    fn matrix_vector_products() {
        let mut mgr = Manager::new();
        let mut diags = diag::List::new();
        // columns (1, 2) (3, 4) (5, 6): a 3 column, 2 row matrix
        let mat = mgr.types.mat(Scalar::F32, VectorSize::Tri, VectorSize::Bi);
        let vec2 = mgr.types.vec(Scalar::F32, VectorSize::Bi);
        let vec3 = mgr.types.vec(Scalar::F32, VectorSize::Tri);
        let mut columns = Vec::new();
        for c in 0..3 {
            let elements = vec![mgr.f32(2.0 * c as f32 + 1.0), mgr.f32(2.0 * c as f32 + 2.0)];
            columns.push(mgr.composite(vec2, elements));
        }
        let m = mgr.composite(mat, columns);
        let elements = vec![mgr.f32(1.0), mgr.f32(0.0), mgr.f32(1.0)];
        let v3 = mgr.composite(vec3, elements);
        let elements = vec![mgr.f32(1.0), mgr.f32(1.0)];
        let v2 = mgr.composite(vec2, elements);
        let mut eval = Eval::new(&mut mgr, &mut diags);
        let mv = eval
            .evaluate(Function::MultiplyMatVec, vec2, &[Some(m), Some(v3)], SPAN)
            .unwrap()
            .unwrap();
        let vm = eval
            .evaluate(Function::MultiplyVecMat, vec3, &[Some(v2), Some(m)], SPAN)
            .unwrap()
            .unwrap();
        assert_eq!(mgr.literals(mv), [Literal::F32(6.0), Literal::F32(8.0)]);
        assert_eq!(
            mgr.literals(vm),
            [Literal::F32(3.0), Literal::F32(7.0), Literal::F32(11.0)]
        );
    }

    #[test]
    fn matrix_products() {
        let mut mgr = Manager::new();
        let mut diags = diag::List::new();
        let mat = mgr.types.mat(Scalar::AbstractFloat, VectorSize::Bi, VectorSize::Bi);
        let scalars: Vec<_> = [1.0, 2.0, 3.0, 4.0]
            .iter()
            .map(|&v| Some(mgr.abstract_float(v)))
            .collect();
        let identity: Vec<_> = [1.0, 0.0, 0.0, 1.0]
            .iter()
            .map(|&v| Some(mgr.abstract_float(v)))
            .collect();
        let mut eval = Eval::new(&mut mgr, &mut diags);
        let m = eval.evaluate(Function::MatInitS, mat, &scalars, SPAN).unwrap();
        let i = eval.evaluate(Function::MatInitS, mat, &identity, SPAN).unwrap();
        let product = eval
            .evaluate(Function::MultiplyMatMat, mat, &[m, i], SPAN)
            .unwrap();
        let squared = eval
            .evaluate(Function::MultiplyMatMat, mat, &[m, m], SPAN)
            .unwrap()
            .unwrap();
        assert_eq!(product, m);
        // [[1, 3], [2, 4]] squared is [[7, 15], [10, 22]]
        let expected = [7.0, 10.0, 15.0, 22.0].map(Literal::AbstractFloat);
        let columns = mgr.elements(squared);
        let flat: Vec<_> = columns.into_iter().flat_map(|c| mgr.literals(c)).collect();
        assert_eq!(flat, expected);
    }

    #[test]
    fn mixed_vector_constructor() {
        let mut mgr = Manager::new();
        let mut diags = diag::List::new();
        let vec2 = mgr.types.vec(Scalar::I32, VectorSize::Bi);
        let vec4 = mgr.types.vec(Scalar::I32, VectorSize::Quad);
        let zero = mgr.i32(0);
        let elements = vec![mgr.i32(1), mgr.i32(2)];
        let xy = mgr.composite(vec2, elements);
        let mut eval = Eval::new(&mut mgr, &mut diags);
        let v = eval
            .evaluate(Function::VecInitM, vec4, &[Some(zero), Some(xy), Some(zero)], SPAN)
            .unwrap()
            .unwrap();
        assert_eq!(mgr.literals(v), [0, 1, 2, 0].map(Literal::I32));
    }
}
