//! Constant folding of builtin function calls.

use super::{number, numbers, Eval, EvalResult};
use crate::constant::number::{Float, Number};
use crate::constant::{KernelResult, Literal, Value};
use crate::ty::{Scalar, Type};
use crate::{BuiltinFn, Handle, Span};

/// Apply `f` to the bits of a 32-bit integer.
fn bits32(literal: Literal, f: impl Fn(u32) -> u32) -> Literal {
    match literal {
        Literal::I32(v) => Literal::I32(f(v as u32) as i32),
        Literal::U32(v) => Literal::U32(f(v)),
        other => unreachable!("{:?} is not a 32-bit integer", other),
    }
}

/// The lowest `count` bits set.
const fn mask(count: u32) -> u32 {
    if count >= 32 {
        u32::MAX
    } else {
        (1 << count) - 1
    }
}

/// Offset and count of a bit field, clamped to fit in 32 bits.
fn bit_field(offset: u32, count: u32) -> (u32, u32) {
    let offset = Ord::min(offset, 32);
    (offset, Ord::min(count, 32 - offset))
}

fn extract_bits(e: Literal, offset: u32, count: u32) -> Literal {
    let (offset, count) = bit_field(offset, count);
    if count == 0 {
        return Literal::zero(e.scalar());
    }
    match e {
        Literal::U32(v) => Literal::U32((v >> offset) & mask(count)),
        Literal::I32(v) => {
            let field = ((v as u32) >> offset) & mask(count);
            let shift = 32 - count;
            Literal::I32(((field << shift) as i32) >> shift)
        }
        other => unreachable!("extractBits of {:?}", other),
    }
}

fn insert_bits(e: Literal, newbits: Literal, offset: u32, count: u32) -> Literal {
    let (offset, count) = bit_field(offset, count);
    if count == 0 {
        return e;
    }
    let field = mask(count) << offset;
    let insert = |e: u32, n: u32| (e & !field) | ((n << offset) & field);
    match (e, newbits) {
        (Literal::U32(e), Literal::U32(n)) => Literal::U32(insert(e, n)),
        (Literal::I32(e), Literal::I32(n)) => Literal::I32(insert(e as u32, n as u32) as i32),
        (e, n) => unreachable!("insertBits of {:?} and {:?}", e, n),
    }
}

fn first_leading_bit(literal: Literal) -> Literal {
    match literal {
        Literal::U32(v) => Literal::U32(match v {
            0 => u32::MAX,
            _ => 31 - v.leading_zeros(),
        }),
        Literal::I32(v) => {
            // for negative values, the first bit that differs from the sign
            let v = (if v < 0 { !v } else { v }) as u32;
            Literal::I32(match v {
                0 => -1,
                _ => (31 - v.leading_zeros()) as i32,
            })
        }
        other => unreachable!("firstLeadingBit of {:?}", other),
    }
}

fn float_sign<F: Float>(x: F) -> F {
    if x > F::ZERO {
        F::ONE
    } else if x < F::ZERO {
        F::ZERO.wrapping_sub(F::ONE)
    } else {
        F::ZERO
    }
}

impl<'a> Eval<'a> {
    fn integer_arg(&self, value: Handle<Value>) -> u32 {
        match self.literal(value) {
            Literal::U32(v) => v,
            other => unreachable!("{:?} is not a u32", other),
        }
    }

    fn clamp_checked<N: Number>(&mut self, span: Span, e: N, low: N, high: N) -> KernelResult<N> {
        if low > high {
            let message = format!(
                "clamp called with 'low' ({}) greater than 'high' ({})",
                low.display(),
                high.display()
            );
            self.recover(message, span, ())?;
        }
        self.clamp(span, e, low, high)
    }

    pub(super) fn builtin(
        &mut self,
        fun: BuiltinFn,
        ty: Handle<Type>,
        args: &[Handle<Value>],
        span: Span,
    ) -> EvalResult {
        match fun {
            BuiltinFn::Abs => self.transform(ty, args, &mut |this, l| {
                Ok(match l[0] {
                    Literal::I32(v) => Literal::I32(v.wrapping_abs()),
                    Literal::U32(v) => Literal::U32(v),
                    Literal::AbstractInt(v) => match v.checked_abs() {
                        Some(v) => Literal::AbstractInt(v),
                        None => {
                            let message = format!("'abs({v})' cannot be represented as 'abstract-int'");
                            this.recover(message, span, Literal::AbstractInt(v))?
                        }
                    },
                    other => with_float!(other.scalar(), F => Float::abs(number::<F>(other)).into_literal()),
                })
            }),
            BuiltinFn::All => {
                let all = self
                    .mgr
                    .literals(args[0])
                    .iter()
                    .all(|l| l.as_bool() == Some(true));
                Ok(Some(self.mgr.bool(all)))
            }
            BuiltinFn::Any => {
                let any = self
                    .mgr
                    .literals(args[0])
                    .iter()
                    .any(|l| l.as_bool() == Some(true));
                Ok(Some(self.mgr.bool(any)))
            }
            BuiltinFn::Ceil => self.transform(ty, args, &mut |_, l| {
                Ok(with_float!(l[0].scalar(), F => Float::ceil(number::<F>(l[0])).into_literal()))
            }),
            BuiltinFn::Floor => self.transform(ty, args, &mut |_, l| {
                Ok(with_float!(l[0].scalar(), F => Float::floor(number::<F>(l[0])).into_literal()))
            }),
            BuiltinFn::Trunc => self.transform(ty, args, &mut |_, l| {
                Ok(with_float!(l[0].scalar(), F => Float::trunc(number::<F>(l[0])).into_literal()))
            }),
            BuiltinFn::Clamp => self.transform(ty, args, &mut |this, l| {
                with_number!(l[0].scalar(), N => {
                    let [e, low, high] = [l[0], l[1], l[2]].map(number::<N>);
                    this.clamp_checked(span, e, low, high).map(Number::into_literal)
                })
            }),
            BuiltinFn::Saturate => self.transform(ty, args, &mut |this, l| {
                with_float!(l[0].scalar(), F => this
                    .clamp(span, number::<F>(l[0]), <F as Number>::ZERO, <F as Number>::ONE)
                    .map(Number::into_literal))
            }),
            BuiltinFn::Max => self.transform(ty, args, &mut |_, l| {
                Ok(with_number!(l[0].scalar(), N => {
                    Number::max(number::<N>(l[0]), number::<N>(l[1])).into_literal()
                }))
            }),
            BuiltinFn::Min => self.transform(ty, args, &mut |_, l| {
                Ok(with_number!(l[0].scalar(), N => {
                    Number::min(number::<N>(l[0]), number::<N>(l[1])).into_literal()
                }))
            }),
            BuiltinFn::CountLeadingZeros => self.transform(ty, args, &mut |_, l| {
                Ok(bits32(l[0], u32::leading_zeros))
            }),
            BuiltinFn::CountOneBits => self.transform(ty, args, &mut |_, l| {
                Ok(bits32(l[0], u32::count_ones))
            }),
            BuiltinFn::CountTrailingZeros => self.transform(ty, args, &mut |_, l| {
                Ok(bits32(l[0], u32::trailing_zeros))
            }),
            BuiltinFn::ReverseBits => self.transform(ty, args, &mut |_, l| {
                Ok(bits32(l[0], u32::reverse_bits))
            }),
            BuiltinFn::FirstLeadingBit => {
                self.transform(ty, args, &mut |_, l| Ok(first_leading_bit(l[0])))
            }
            BuiltinFn::FirstTrailingBit => self.transform(ty, args, &mut |_, l| {
                Ok(bits32(l[0], |v| match v {
                    0 => u32::MAX,
                    _ => v.trailing_zeros(),
                }))
            }),
            BuiltinFn::ExtractBits => {
                let offset = self.integer_arg(args[1]);
                let count = self.integer_arg(args[2]);
                self.transform(ty, &args[..1], &mut |_, l| Ok(extract_bits(l[0], offset, count)))
            }
            BuiltinFn::InsertBits => {
                let offset = self.integer_arg(args[2]);
                let count = self.integer_arg(args[3]);
                self.transform(ty, &args[..2], &mut |_, l| {
                    Ok(insert_bits(l[0], l[1], offset, count))
                })
            }
            BuiltinFn::Cross => {
                let a = self.mgr.literals(args[0]);
                let b = self.mgr.literals(args[1]);
                let components = with_number!(a[0].scalar(), N => {
                    let a = numbers::<N>(&a);
                    let b = numbers::<N>(&b);
                    let x = self.det2(span, a[1], b[1], a[2], b[2])?;
                    let y = self.det2(span, a[2], b[2], a[0], b[0])?;
                    let z = self.det2(span, a[0], b[0], a[1], b[1])?;
                    [x, y, z].map(Number::into_literal)
                });
                let elements = components.iter().map(|&l| self.mgr.scalar(l)).collect();
                Ok(Some(self.mgr.composite(ty, elements)))
            }
            BuiltinFn::Determinant => {
                let columns = self.columns(args[0]);
                let scalars = columns.concat();
                let determinant = with_number!(scalars[0].scalar(), N => {
                    let m = numbers::<N>(&scalars);
                    let det = match columns.len() {
                        2 => self.det2(span, m[0], m[1], m[2], m[3]),
                        3 => self.det3(span, m[0], m[1], m[2], m[3], m[4], m[5], m[6], m[7], m[8]),
                        4 => self.det4(
                            span,
                            [
                                [m[0], m[1], m[2], m[3]],
                                [m[4], m[5], m[6], m[7]],
                                [m[8], m[9], m[10], m[11]],
                                [m[12], m[13], m[14], m[15]],
                            ],
                        ),
                        n => unreachable!("determinant of a {n}x{n} matrix"),
                    };
                    det?.into_literal()
                });
                Ok(Some(self.mgr.scalar(determinant)))
            }
            BuiltinFn::Dot => {
                let a = self.mgr.literals(args[0]);
                let b = self.mgr.literals(args[1]);
                let dot = self.dot_literals(&a, &b, span)?;
                Ok(Some(self.mgr.scalar(dot)))
            }
            BuiltinFn::Length => {
                let v = self.mgr.literals(args[0]);
                let length = with_float!(v[0].scalar(), F => {
                    let v = numbers::<F>(&v);
                    let length = if v.len() == 1 {
                        Float::abs(v[0])
                    } else {
                        let squared = self.dot(span, &v, &v)?;
                        self.sqrt(span, squared)?
                    };
                    length.into_literal()
                });
                Ok(Some(self.mgr.scalar(length)))
            }
            BuiltinFn::Select => self.transform(ty, args, &mut |_, l| {
                Ok(match l[2] {
                    Literal::Bool(true) => l[1],
                    Literal::Bool(false) => l[0],
                    other => unreachable!("select condition {:?}", other),
                })
            }),
            BuiltinFn::Sign => self.transform(ty, args, &mut |_, l| {
                Ok(match l[0] {
                    Literal::I32(v) => Literal::I32(v.signum()),
                    Literal::AbstractInt(v) => Literal::AbstractInt(v.signum()),
                    other => with_float!(other.scalar(), F => float_sign(number::<F>(other)).into_literal()),
                })
            }),
            BuiltinFn::Sqrt => self.transform(ty, args, &mut |this, l| {
                with_float!(l[0].scalar(), F => this
                    .sqrt(span, number::<F>(l[0]))
                    .map(Number::into_literal))
            }),
            BuiltinFn::Step => self.transform(ty, args, &mut |_, l| {
                Ok(with_float!(l[0].scalar(), F => {
                    let (edge, x) = (number::<F>(l[0]), number::<F>(l[1]));
                    let step = if x >= edge { <F as Number>::ONE } else { <F as Number>::ZERO };
                    step.into_literal()
                }))
            }),
            BuiltinFn::Transpose => {
                let columns: Vec<Vec<Handle<Value>>> = self
                    .mgr
                    .elements(args[0])
                    .into_iter()
                    .map(|column| self.mgr.elements(column))
                    .collect();
                let rows = columns[0].len();
                let mut transposed = Vec::with_capacity(rows);
                for row in 0..rows {
                    let column_ty = self.element_type(ty, row);
                    let elements = columns.iter().map(|column| column[row]).collect();
                    transposed.push(self.mgr.composite(column_ty, elements));
                }
                Ok(Some(self.mgr.composite(ty, transposed)))
            }
            BuiltinFn::TextureDimensions
            | BuiltinFn::TextureSampleLevel
            | BuiltinFn::TextureSampleBaseClampToEdge => {
                log::debug!("{} cannot be evaluated at shader creation time", fun);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::constant::{Eval, EvalResult, Failure, Function, Literal, Manager};
    use crate::diag::{List, Severity};
    use crate::ty::{Scalar, VectorSize};
    use crate::{BuiltinFn, Handle, Span};

    const SPAN: Span = Span::new(0, 4);

    fn call(
        mgr: &mut Manager,
        diags: &mut List,
        fun: BuiltinFn,
        ty: Handle<crate::ty::Type>,
        args: &[Handle<crate::constant::Value>],
    ) -> EvalResult {
        let args: Vec<_> = args.iter().copied().map(Some).collect();
        Eval::new(mgr, diags).evaluate(Function::Builtin(fun), ty, &args, SPAN)
    }

    fn scalar(mgr: &Manager, result: EvalResult) -> Literal {
        mgr.literal(result.unwrap().unwrap()).unwrap()
    }

    #[test]
    fn bit_scans() {
        let mut mgr = Manager::new();
        let mut diags = List::new();
        let i32 = mgr.types.i32();
        let u32 = mgr.types.u32();
        let zero = mgr.u32(0);
        let minus_one = mgr.i32(-1);
        let minus_two = mgr.i32(-2);
        let eight = mgr.u32(8);
        let cases = [
            (BuiltinFn::CountLeadingZeros, u32, zero, Literal::U32(32)),
            (BuiltinFn::CountTrailingZeros, u32, zero, Literal::U32(32)),
            (BuiltinFn::CountLeadingZeros, u32, eight, Literal::U32(28)),
            (BuiltinFn::CountOneBits, i32, minus_one, Literal::I32(32)),
            (BuiltinFn::FirstLeadingBit, u32, zero, Literal::U32(u32::MAX)),
            (BuiltinFn::FirstLeadingBit, i32, minus_one, Literal::I32(-1)),
            (BuiltinFn::FirstLeadingBit, i32, minus_two, Literal::I32(0)),
            (BuiltinFn::FirstLeadingBit, u32, eight, Literal::U32(3)),
            (BuiltinFn::FirstTrailingBit, u32, zero, Literal::U32(u32::MAX)),
            (BuiltinFn::FirstTrailingBit, u32, eight, Literal::U32(3)),
            (BuiltinFn::ReverseBits, u32, eight, Literal::U32(0x1000_0000)),
        ];
        for (fun, ty, arg, expected) in cases {
            let result = call(&mut mgr, &mut diags, fun, ty, &[arg]);
            assert_eq!(scalar(&mgr, result), expected, "{fun}");
        }
        assert!(diags.is_empty());
    }

    #[test]
    fn bit_fields() {
        let mut mgr = Manager::new();
        let mut diags = List::new();
        let i32 = mgr.types.i32();
        let u32 = mgr.types.u32();
        let e = mgr.i32(0b1110_0000);
        let newbits = mgr.u32(0b11);
        let target = mgr.u32(0);
        let four = mgr.u32(4);
        let five = mgr.u32(5);
        let three = mgr.u32(3);
        let zero = mgr.u32(0);
        let extracted = call(&mut mgr, &mut diags, BuiltinFn::ExtractBits, i32, &[e, five, three]);
        assert_eq!(scalar(&mgr, extracted), Literal::I32(-1));
        let empty = call(&mut mgr, &mut diags, BuiltinFn::ExtractBits, i32, &[e, five, zero]);
        assert_eq!(scalar(&mgr, empty), Literal::I32(0));
        let inserted = call(
            &mut mgr,
            &mut diags,
            BuiltinFn::InsertBits,
            u32,
            &[target, newbits, four, five],
        );
        assert_eq!(scalar(&mgr, inserted), Literal::U32(0b11_0000));
    }

    #[test]
    fn bit_fields_past_the_end() {
        let mut mgr = Manager::new();
        let mut diags = List::new();
        let u32 = mgr.types.u32();
        let top = mgr.u32(0xc000_0000);
        let thirty = mgr.u32(30);
        let ten = mgr.u32(10);
        let forty = mgr.u32(40);
        let ones = mgr.u32(u32::MAX);
        let extracted = call(&mut mgr, &mut diags, BuiltinFn::ExtractBits, u32, &[top, thirty, ten]);
        assert_eq!(scalar(&mgr, extracted), Literal::U32(0b11));
        let unchanged = call(&mut mgr, &mut diags, BuiltinFn::InsertBits, u32, &[top, ones, forty, ten]);
        assert_eq!(scalar(&mgr, unchanged), Literal::U32(0xc000_0000));
        assert!(diags.is_empty());
    }

    #[test]
    fn clamp_with_inverted_bounds() {
        let mut mgr = Manager::new();
        let mut diags = List::new();
        let f32 = mgr.types.f32();
        let e = mgr.f32(0.5);
        let low = mgr.f32(2.0);
        let high = mgr.f32(1.0);
        let result = call(&mut mgr, &mut diags, BuiltinFn::Clamp, f32, &[e, low, high]);
        assert_eq!(result, Err(Failure));
        assert_eq!(
            diags.iter().next().map(|d| d.message.as_str()),
            Some("clamp called with 'low' (2.0) greater than 'high' (1.0)")
        );

        let mut warnings = List::new();
        let args = [Some(e), Some(low), Some(high)];
        let result = Eval::with_runtime_semantics(&mut mgr, &mut warnings).evaluate(
            Function::Builtin(BuiltinFn::Clamp),
            f32,
            &args,
            SPAN,
        );
        assert_eq!(scalar(&mgr, result), Literal::F32(1.0));
        assert_eq!(warnings.iter().next().map(|d| d.severity), Some(Severity::Warning));
    }

    #[test]
    fn saturate_vector() {
        let mut mgr = Manager::new();
        let mut diags = List::new();
        let vec4 = mgr.types.vec(Scalar::F32, VectorSize::Quad);
        let elements = vec![mgr.f32(-1.0), mgr.f32(0.25), mgr.f32(1.5), mgr.f32(1.0)];
        let v = mgr.composite(vec4, elements);
        let result = call(&mut mgr, &mut diags, BuiltinFn::Saturate, vec4, &[v]).unwrap().unwrap();
        assert_eq!(mgr.literals(result), [0.0, 0.25, 1.0, 1.0].map(Literal::F32));
    }

    #[test]
    fn geometry() {
        let mut mgr = Manager::new();
        let mut diags = List::new();
        let vec3 = mgr.types.vec(Scalar::F32, VectorSize::Tri);
        let f32 = mgr.types.f32();
        let x = vec![mgr.f32(1.0), mgr.f32(0.0), mgr.f32(0.0)];
        let x = mgr.composite(vec3, x);
        let y = vec![mgr.f32(0.0), mgr.f32(1.0), mgr.f32(0.0)];
        let y = mgr.composite(vec3, y);
        let v = vec![mgr.f32(2.0), mgr.f32(3.0), mgr.f32(6.0)];
        let v = mgr.composite(vec3, v);

        let z = call(&mut mgr, &mut diags, BuiltinFn::Cross, vec3, &[x, y]).unwrap().unwrap();
        assert_eq!(mgr.literals(z), [0.0, 0.0, 1.0].map(Literal::F32));
        let length = call(&mut mgr, &mut diags, BuiltinFn::Length, f32, &[v]);
        assert_eq!(scalar(&mgr, length), Literal::F32(7.0));
        let dot = call(&mut mgr, &mut diags, BuiltinFn::Dot, f32, &[v, y]);
        assert_eq!(scalar(&mgr, dot), Literal::F32(3.0));
    }

    #[test]
    fn matrices() {
        let mut mgr = Manager::new();
        let mut diags = List::new();
        let mat2x3 = mgr.types.mat(Scalar::F32, VectorSize::Bi, VectorSize::Tri);
        let mat3x2 = mgr.types.mat(Scalar::F32, VectorSize::Tri, VectorSize::Bi);
        let mat2 = mgr.types.mat(Scalar::I32, VectorSize::Bi, VectorSize::Bi);
        let i32 = mgr.types.i32();
        let scalars: Vec<_> = (1..=6).map(|v| Some(mgr.f32(v as f32))).collect();
        let m = Eval::new(&mut mgr, &mut diags)
            .evaluate(Function::MatInitS, mat2x3, &scalars, SPAN)
            .unwrap()
            .unwrap();
        let t = call(&mut mgr, &mut diags, BuiltinFn::Transpose, mat3x2, &[m]).unwrap().unwrap();
        let columns: Vec<_> = mgr.elements(t).into_iter().map(|c| mgr.literals(c)).collect();
        assert_eq!(
            columns,
            [
                [1.0, 4.0].map(Literal::F32),
                [2.0, 5.0].map(Literal::F32),
                [3.0, 6.0].map(Literal::F32),
            ]
        );

        let scalars: Vec<_> = [1, 2, 3, 4].iter().map(|&v| Some(mgr.i32(v))).collect();
        let m = Eval::new(&mut mgr, &mut diags)
            .evaluate(Function::MatInitS, mat2, &scalars, SPAN)
            .unwrap()
            .unwrap();
        let det = call(&mut mgr, &mut diags, BuiltinFn::Determinant, i32, &[m]);
        assert_eq!(scalar(&mgr, det), Literal::I32(-2));
    }

    #[test]
    fn select_and_reductions() {
        let mut mgr = Manager::new();
        let mut diags = List::new();
        let vec2b = mgr.types.vec(Scalar::Bool, VectorSize::Bi);
        let vec2 = mgr.types.vec(Scalar::U32, VectorSize::Bi);
        let boolean = mgr.types.bool();
        let t = mgr.bool(true);
        let f = mgr.bool(false);
        let mask = mgr.composite(vec2b, vec![t, f]);
        let one = mgr.u32(1);
        let two = mgr.u32(2);
        let ones = mgr.splat(vec2, one, 2);
        let twos = mgr.splat(vec2, two, 2);
        let picked = call(&mut mgr, &mut diags, BuiltinFn::Select, vec2, &[ones, twos, mask])
            .unwrap()
            .unwrap();
        assert_eq!(mgr.literals(picked), [Literal::U32(2), Literal::U32(1)]);
        let all = call(&mut mgr, &mut diags, BuiltinFn::All, boolean, &[mask]);
        assert_eq!(scalar(&mgr, all), Literal::Bool(false));
        let any = call(&mut mgr, &mut diags, BuiltinFn::Any, boolean, &[mask]);
        assert_eq!(scalar(&mgr, any), Literal::Bool(true));
    }

    #[test]
    fn sign_step_rounding() {
        let mut mgr = Manager::new();
        let mut diags = List::new();
        let f32 = mgr.types.f32();
        let ai = mgr.types.abstract_int();
        let minus = mgr.f32(-2.5);
        let plus = mgr.f32(2.5);
        let big = mgr.abstract_int(-7);
        let cases = [
            (BuiltinFn::Sign, f32, vec![minus], Literal::F32(-1.0)),
            (BuiltinFn::Sign, ai, vec![big], Literal::AbstractInt(-1)),
            (BuiltinFn::Abs, ai, vec![big], Literal::AbstractInt(7)),
            (BuiltinFn::Floor, f32, vec![minus], Literal::F32(-3.0)),
            (BuiltinFn::Ceil, f32, vec![minus], Literal::F32(-2.0)),
            (BuiltinFn::Trunc, f32, vec![minus], Literal::F32(-2.0)),
            (BuiltinFn::Step, f32, vec![minus, plus], Literal::F32(1.0)),
            (BuiltinFn::Step, f32, vec![plus, minus], Literal::F32(0.0)),
            (BuiltinFn::Max, f32, vec![minus, plus], Literal::F32(2.5)),
            (BuiltinFn::Min, f32, vec![minus, plus], Literal::F32(-2.5)),
        ];
        for (fun, ty, args, expected) in cases {
            let result = call(&mut mgr, &mut diags, fun, ty, &args);
            assert_eq!(scalar(&mgr, result), expected, "{fun}");
        }
    }

    #[test]
    fn texture_builtins_are_not_constant() {
        let mut mgr = Manager::new();
        let mut diags = List::new();
        let vec2u = mgr.types.vec(Scalar::U32, VectorSize::Bi);
        let zero = mgr.u32(0);
        let result = call(&mut mgr, &mut diags, BuiltinFn::TextureDimensions, vec2u, &[zero]);
        assert_eq!(result, Ok(None));
    }
}
