/*! Replacement of builtin calls the target cannot execute.

Each enabled builtin call is rewritten into primitive instructions inserted
just before it. Every user of the call's result is then redirected to the new
value, and the call is destroyed.

The integer bit scans work on 32-bit values by binary search: five rounds
test the upper or lower 16, 8, 4, 2 and 1 bits of what remains, and `select`
the size of the round into the running count when that part is all zeros.
Signed operands are reinterpreted as unsigned for the search and the result
is reinterpreted back.
*/

use crate::arena::Handle;
use crate::constant::Literal;
use crate::ir::{BinaryOp, Builder, Instruction, InstructionKind, Module, UnaryOp, Value, ValidationError};
use crate::ty::{ImageDimension, Scalar, Type, VectorSize};
use crate::BuiltinFn;

/// Which builtins [`builtin_polyfill`] rewrites.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct BuiltinPolyfillConfig {
    pub count_leading_zeros: bool,
    pub count_trailing_zeros: bool,
    pub first_leading_bit: bool,
    pub first_trailing_bit: bool,
    pub saturate: bool,
    /// `textureSampleBaseClampToEdge` on `texture_2d<f32>`.
    pub texture_sample_base_clamp_to_edge_2d_f32: bool,
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum PolyfillError {
    #[error("invalid module: {0}")]
    Validation(#[from] ValidationError),
}

/// Rewrite the builtin calls enabled in `config`.
///
/// The module is validated first and left untouched if it is invalid.
pub fn builtin_polyfill(module: &mut Module, config: &BuiltinPolyfillConfig) -> Result<(), PolyfillError> {
    module.validate()?;

    let worklist = collect(module, config);
    log::debug!("polyfilling {} builtin calls", worklist.len());
    for (call, fun) in worklist {
        polyfill_call(module, call, fun);
    }
    Ok(())
}

fn collect(module: &Module, config: &BuiltinPolyfillConfig) -> Vec<(Handle<Instruction>, BuiltinFn)> {
    let types = &module.constants.types;
    let mut worklist = Vec::new();
    for (_, function) in module.functions() {
        for &instruction in module[function.block()].instructions() {
            let inst = &module[instruction];
            let fun = match *inst.kind() {
                InstructionKind::Call(fun) => fun,
                _ => continue,
            };
            let arg_ty = || &types[module.value_type(inst.operands()[0])];
            let enabled = match fun {
                BuiltinFn::CountLeadingZeros => config.count_leading_zeros,
                BuiltinFn::CountTrailingZeros => config.count_trailing_zeros,
                BuiltinFn::FirstLeadingBit => config.first_leading_bit,
                BuiltinFn::FirstTrailingBit => config.first_trailing_bit,
                BuiltinFn::Saturate => config.saturate,
                BuiltinFn::TextureSampleBaseClampToEdge => {
                    config.texture_sample_base_clamp_to_edge_2d_f32
                        && *arg_ty()
                            == Type::SampledTexture {
                                dim: ImageDimension::D2,
                                sampled: Scalar::F32,
                            }
                }
                _ => false,
            };
            if enabled {
                worklist.push((instruction, fun));
            } else {
                log::debug!("leaving {:?} ({})", instruction, fun);
            }
        }
    }
    worklist
}

fn polyfill_call(module: &mut Module, call: Handle<Instruction>, fun: BuiltinFn) {
    let args = module[call].operands().to_vec();
    let result = match module[call].result() {
        Some(result) => result,
        None => unreachable!("{fun} call without a result"),
    };
    let ty = module.value_type(result);

    let mut b = Builder::before(module, call);
    let replacement = match fun {
        BuiltinFn::CountLeadingZeros => BitScan::new(&mut b, ty).count_leading_zeros(args[0]),
        BuiltinFn::CountTrailingZeros => BitScan::new(&mut b, ty).count_trailing_zeros(args[0]),
        BuiltinFn::FirstLeadingBit => BitScan::new(&mut b, ty).first_leading_bit(args[0]),
        BuiltinFn::FirstTrailingBit => BitScan::new(&mut b, ty).first_trailing_bit(args[0]),
        BuiltinFn::Saturate => saturate(&mut b, ty, args[0]),
        BuiltinFn::TextureSampleBaseClampToEdge => {
            texture_sample_base_clamp_to_edge(&mut b, ty, args[0], args[1], args[2])
        }
        other => unreachable!("no polyfill for {other}"),
    };
    log::trace!("polyfilled {:?} ({})", call, fun);

    if let Some(name) = module.take_name(result) {
        module.set_name(replacement, &name);
    }
    module.replace_all_uses_with(result, replacement);
    module.destroy(call);
}

/// Emits the instructions of the integer bit scans.
struct BitScan<'b, 'm> {
    b: &'b mut Builder<'m>,
    /// Type of the operand and the result.
    ty: Handle<Type>,
    /// `u32` or a vector of them, as wide as `ty`.
    uint: Handle<Type>,
    boolean: Handle<Type>,
    signed: bool,
}

impl<'b, 'm> BitScan<'b, 'm> {
    fn new(b: &'b mut Builder<'m>, ty: Handle<Type>) -> Self {
        let scalar = b.types()[ty].scalar();
        let scalar = match scalar {
            Some(scalar @ (Scalar::I32 | Scalar::U32)) => scalar,
            _ => unreachable!("bit scan of {}", b.types().name(ty)),
        };
        let uint = b.types().match_width(Scalar::U32, ty);
        let boolean = b.types().match_width(Scalar::Bool, ty);
        BitScan {
            b,
            ty,
            uint,
            boolean,
            signed: scalar == Scalar::I32,
        }
    }

    fn constant(&mut self, value: u32) -> Handle<Value> {
        self.b.u32_like(self.uint, value)
    }

    fn binary(&mut self, op: BinaryOp, lhs: Handle<Value>, rhs: Handle<Value>) -> Handle<Value> {
        self.b.binary(op, self.uint, lhs, rhs)
    }

    /// `x op value`, as a boolean.
    fn test(&mut self, op: BinaryOp, x: Handle<Value>, value: u32) -> Handle<Value> {
        let value = self.constant(value);
        self.b.binary(op, self.boolean, x, value)
    }

    /// `(x & mask) == 0`
    fn none_set(&mut self, x: Handle<Value>, mask: u32) -> Handle<Value> {
        let mask = self.constant(mask);
        let masked = self.binary(BinaryOp::And, x, mask);
        let zero = self.constant(0);
        self.b.binary(BinaryOp::Equal, self.boolean, masked, zero)
    }

    /// `cond ? if_true : if_false`
    fn select(&mut self, if_false: u32, if_true: u32, cond: Handle<Value>) -> Handle<Value> {
        let if_false = self.constant(if_false);
        let if_true = self.constant(if_true);
        self.b.call(self.uint, BuiltinFn::Select, &[if_false, if_true, cond])
    }

    /// `a | (b | (c | ...))`
    fn or_all(&mut self, parts: &[Handle<Value>]) -> Handle<Value> {
        let (&last, rest) = match parts.split_last() {
            Some(split) => split,
            None => unreachable!("nothing to combine"),
        };
        rest.iter()
            .rev()
            .fold(last, |acc, &part| self.binary(BinaryOp::Or, part, acc))
    }

    fn to_unsigned(&mut self, x: Handle<Value>) -> Handle<Value> {
        if self.signed {
            self.b.bitcast(self.uint, x)
        } else {
            x
        }
    }

    fn from_unsigned(&mut self, x: Handle<Value>) -> Handle<Value> {
        if self.signed {
            self.b.bitcast(self.ty, x)
        } else {
            x
        }
    }

    fn count_leading_zeros(mut self, arg: Handle<Value>) -> Handle<Value> {
        let mut x = self.to_unsigned(arg);
        let mut parts = Vec::with_capacity(5);
        for (bits, limit) in [(16, 0x0000_ffff), (8, 0x00ff_ffff), (4, 0x0fff_ffff), (2, 0x3fff_ffff)] {
            let cond = self.test(BinaryOp::LessThanEqual, x, limit);
            let part = self.select(0, bits, cond);
            x = self.binary(BinaryOp::ShiftLeft, x, part);
            parts.push(part);
        }
        let cond = self.test(BinaryOp::LessThanEqual, x, 0x7fff_ffff);
        parts.push(self.select(0, 1, cond));
        let is_zero = self.test(BinaryOp::Equal, x, 0);
        let zero_fix = self.select(0, 1, is_zero);

        let count = self.or_all(&parts);
        let count = self.binary(BinaryOp::Add, count, zero_fix);
        self.from_unsigned(count)
    }

    /// The rounds shared by the trailing scans. Returns the shifted operand
    /// and the per-round counts.
    fn trailing_rounds(&mut self, arg: Handle<Value>) -> (Handle<Value>, Vec<Handle<Value>>) {
        let mut x = self.to_unsigned(arg);
        let mut parts = Vec::with_capacity(5);
        for (bits, mask) in [(16, 0x0000_ffff), (8, 0xff), (4, 0xf), (2, 0x3)] {
            let cond = self.none_set(x, mask);
            let part = self.select(0, bits, cond);
            x = self.binary(BinaryOp::ShiftRight, x, part);
            parts.push(part);
        }
        let cond = self.none_set(x, 0x1);
        parts.push(self.select(0, 1, cond));
        (x, parts)
    }

    fn count_trailing_zeros(mut self, arg: Handle<Value>) -> Handle<Value> {
        let (x, parts) = self.trailing_rounds(arg);
        let is_zero = self.test(BinaryOp::Equal, x, 0);
        let zero_fix = self.select(0, 1, is_zero);

        let count = self.or_all(&parts);
        let count = self.binary(BinaryOp::Add, count, zero_fix);
        self.from_unsigned(count)
    }

    fn first_trailing_bit(mut self, arg: Handle<Value>) -> Handle<Value> {
        let (x, parts) = self.trailing_rounds(arg);
        let position = self.or_all(&parts);
        let position = self.none_found(x, position);
        self.from_unsigned(position)
    }

    fn first_leading_bit(mut self, arg: Handle<Value>) -> Handle<Value> {
        let mut x = self.to_unsigned(arg);
        if self.signed {
            // Scan the complement of negative values, for the first bit that
            // differs from the sign.
            let inverted = self.b.unary(UnaryOp::Complement, self.uint, x);
            let positive = self.test(BinaryOp::LessThan, x, 0x8000_0000);
            x = self.b.call(self.uint, BuiltinFn::Select, &[inverted, x, positive]);
        }
        let mut parts = Vec::with_capacity(5);
        for (bits, mask) in [(16, 0xffff_0000), (8, 0xff00), (4, 0xf0), (2, 0xc)] {
            let cond = self.none_set(x, mask);
            let part = self.select(bits, 0, cond);
            x = self.binary(BinaryOp::ShiftRight, x, part);
            parts.push(part);
        }
        let cond = self.none_set(x, 0x2);
        parts.push(self.select(1, 0, cond));

        let position = self.or_all(&parts);
        let position = self.none_found(x, position);
        self.from_unsigned(position)
    }

    /// `x == 0 ? 0xffffffff : position`
    fn none_found(&mut self, x: Handle<Value>, position: Handle<Value>) -> Handle<Value> {
        let is_zero = self.test(BinaryOp::Equal, x, 0);
        let not_found = self.constant(u32::MAX);
        self.b.call(self.uint, BuiltinFn::Select, &[position, not_found, is_zero])
    }
}

fn saturate(b: &mut Builder<'_>, ty: Handle<Type>, x: Handle<Value>) -> Handle<Value> {
    let scalar = b.types()[ty].scalar();
    let scalar = match scalar {
        Some(scalar @ (Scalar::F32 | Scalar::F16)) => scalar,
        _ => unreachable!("saturate of {}", b.types().name(ty)),
    };
    let zero = b.splat(ty, Literal::zero(scalar));
    let one = b.splat(ty, Literal::one(scalar));
    b.call(ty, BuiltinFn::Clamp, &[x, zero, one])
}

fn texture_sample_base_clamp_to_edge(
    b: &mut Builder<'_>,
    ty: Handle<Type>,
    texture: Handle<Value>,
    sampler: Handle<Value>,
    coords: Handle<Value>,
) -> Handle<Value> {
    let vec2u = b.types().vec(Scalar::U32, VectorSize::Bi);
    let vec2f = b.types().vec(Scalar::F32, VectorSize::Bi);

    let dims = b.call(vec2u, BuiltinFn::TextureDimensions, &[texture]);
    let dims = b.convert(vec2f, dims);
    let half = b.splat(vec2f, Literal::F32(0.5));
    let half_texel = b.binary(BinaryOp::Divide, vec2f, half, dims);
    let one = b.splat(vec2f, Literal::F32(1.0));
    let upper = b.binary(BinaryOp::Subtract, vec2f, one, half_texel);
    let clamped = b.call(vec2f, BuiltinFn::Clamp, &[coords, half_texel, upper]);
    let level = b.f32(0.0);
    b.call(ty, BuiltinFn::TextureSampleLevel, &[texture, sampler, clamped, level])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant;
    use crate::diag;
    use crate::ir::interpret;

    /// A module with `fn f(x: ty) -> ty { return fun(x); }`.
    fn single_call(fun: BuiltinFn, ty: Handle<Type>, module: &mut Module) -> Handle<crate::ir::Function> {
        let function = module.add_function("f", &[ty], Some(ty));
        let block = module[function].block();
        let x = module[function].params()[0];
        let mut b = Builder::at_end(module, block);
        let result = b.call(ty, fun, &[x]);
        b.ret(Some(result));
        function
    }

    fn config_for(fun: BuiltinFn) -> BuiltinPolyfillConfig {
        let mut config = BuiltinPolyfillConfig::default();
        match fun {
            BuiltinFn::CountLeadingZeros => config.count_leading_zeros = true,
            BuiltinFn::CountTrailingZeros => config.count_trailing_zeros = true,
            BuiltinFn::FirstLeadingBit => config.first_leading_bit = true,
            BuiltinFn::FirstTrailingBit => config.first_trailing_bit = true,
            BuiltinFn::Saturate => config.saturate = true,
            _ => unreachable!(),
        }
        config
    }

    /// Run the polyfilled `fun` on each input and compare with direct
    /// constant evaluation of the builtin.
    fn check_equivalent(fun: BuiltinFn, inputs: &[Literal]) {
        let mut module = Module::new();
        let ty = module.types().scalar(inputs[0].scalar());
        let function = single_call(fun, ty, &mut module);
        builtin_polyfill(&mut module, &config_for(fun)).unwrap();
        module.validate().unwrap();
        assert!(module
            .instructions()
            .filter(|&(_, inst)| inst.is_alive())
            .all(|(_, inst)| *inst.kind() != InstructionKind::Call(fun)));

        for &input in inputs {
            let mut diagnostics = diag::List::new();
            let arg = module.constants.scalar(input);
            let polyfilled = interpret::run(&mut module, function, &[arg], &mut diagnostics).unwrap();

            let mut eval = constant::Eval::new(&mut module.constants, &mut diagnostics);
            let expected = eval
                .evaluate(constant::Function::Builtin(fun), ty, &[Some(arg)], crate::Span::UNDEFINED)
                .unwrap()
                .unwrap();
            assert_eq!(
                module.constants.literal(polyfilled),
                module.constants.literal(expected),
                "{fun}({input})"
            );
            assert!(diagnostics.is_empty());
        }
    }

    const U32_INPUTS: [u32; 12] = [
        0,
        1,
        2,
        3,
        0x80,
        0x1_0000,
        0x0f0f_0000,
        0x7fff_ffff,
        0x8000_0000,
        0x8000_0001,
        0xffff_fffe,
        u32::MAX,
    ];

    const I32_INPUTS: [i32; 9] = [0, 1, -1, 2, -2, 0x7fff_ffff, i32::MIN, -0x100, 0x1_0000];

    fn u32_inputs() -> Vec<Literal> {
        U32_INPUTS.iter().map(|&v| Literal::U32(v)).collect()
    }

    fn i32_inputs() -> Vec<Literal> {
        I32_INPUTS.iter().map(|&v| Literal::I32(v)).collect()
    }

    #[test]
    fn count_leading_zeros() {
        check_equivalent(BuiltinFn::CountLeadingZeros, &u32_inputs());
        check_equivalent(BuiltinFn::CountLeadingZeros, &i32_inputs());
    }

    #[test]
    fn count_trailing_zeros() {
        check_equivalent(BuiltinFn::CountTrailingZeros, &u32_inputs());
        check_equivalent(BuiltinFn::CountTrailingZeros, &i32_inputs());
    }

    #[test]
    fn first_leading_bit() {
        check_equivalent(BuiltinFn::FirstLeadingBit, &u32_inputs());
        check_equivalent(BuiltinFn::FirstLeadingBit, &i32_inputs());
    }

    #[test]
    fn first_trailing_bit() {
        check_equivalent(BuiltinFn::FirstTrailingBit, &u32_inputs());
        check_equivalent(BuiltinFn::FirstTrailingBit, &i32_inputs());
    }

    #[test]
    fn saturate_matches_clamp() {
        let inputs = [-1.5, -0.0, 0.0, 0.25, 1.0, 7.0, f32::MAX, f32::NAN];
        check_equivalent(BuiltinFn::Saturate, &inputs.map(Literal::F32));
    }

    #[test]
    fn vector_bit_scan() {
        let mut module = Module::new();
        let vec3 = module.types().vec(Scalar::U32, VectorSize::Tri);
        let function = single_call(BuiltinFn::CountLeadingZeros, vec3, &mut module);
        builtin_polyfill(&mut module, &config_for(BuiltinFn::CountLeadingZeros)).unwrap();

        let elements = [0u32, 1, 0x8000_0000].map(|v| module.constants.u32(v));
        let arg = module.constants.composite(vec3, elements.to_vec());
        let mut diagnostics = diag::List::new();
        let result = interpret::run(&mut module, function, &[arg], &mut diagnostics).unwrap();
        assert_eq!(
            module.constants.literals(result),
            [Literal::U32(32), Literal::U32(31), Literal::U32(0)]
        );
    }

    #[test]
    fn disabled_builtins_stay() {
        let mut module = Module::new();
        let u32 = module.types().u32();
        single_call(BuiltinFn::CountLeadingZeros, u32, &mut module);
        let before = module.disassemble();
        let config = BuiltinPolyfillConfig {
            count_trailing_zeros: true,
            saturate: true,
            ..Default::default()
        };
        builtin_polyfill(&mut module, &config).unwrap();
        assert_eq!(module.disassemble(), before);
    }
}
