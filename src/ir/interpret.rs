/*! Execution of IR functions on constant arguments.

Every instruction is folded with the constant evaluator, using runtime
semantics: numeric problems are reported as warnings and execution goes on
with the value the hardware would produce. This makes the interpreter a
reference for checking that IR rewrites preserve behavior.
*/

use super::{BinaryOp, Function, InstructionKind, Module, UnaryOp, Value};
use crate::arena::Handle;
use crate::constant::{self, Eval, Failure};
use crate::ty::Type;
use crate::{diag, BuiltinFn, FastHashMap, Span};

#[derive(Clone, Debug, thiserror::Error)]
pub enum InterpretError {
    #[error("function takes {expected} arguments, {found} given")]
    ArgumentCount { expected: usize, found: usize },
    #[error("argument {index} has type {found}, {expected} expected")]
    ArgumentType {
        index: usize,
        expected: String,
        found: String,
    },
    #[error("{0} cannot be interpreted")]
    Unsupported(String),
    #[error("{0:?} is used before it is defined")]
    Undefined(Handle<Value>),
    #[error(transparent)]
    Failed(#[from] Failure),
    #[error("function ended without returning a value")]
    NoReturn,
}

fn binary_function(op: BinaryOp, lhs: &Type, rhs: &Type) -> constant::Function {
    use constant::Function as Cf;
    match op {
        BinaryOp::Add => Cf::Plus,
        BinaryOp::Subtract => Cf::Minus,
        BinaryOp::Multiply => match (lhs, rhs) {
            (&Type::Matrix { .. }, &Type::Vector { .. }) => Cf::MultiplyMatVec,
            (&Type::Vector { .. }, &Type::Matrix { .. }) => Cf::MultiplyVecMat,
            (&Type::Matrix { .. }, &Type::Matrix { .. }) => Cf::MultiplyMatMat,
            _ => Cf::Multiply,
        },
        BinaryOp::Divide => Cf::Divide,
        BinaryOp::Modulo => Cf::Modulo,
        BinaryOp::And => Cf::And,
        BinaryOp::Or => Cf::Or,
        BinaryOp::Xor => Cf::Xor,
        BinaryOp::Equal => Cf::Equal,
        BinaryOp::NotEqual => Cf::NotEqual,
        BinaryOp::LessThan => Cf::LessThan,
        BinaryOp::GreaterThan => Cf::GreaterThan,
        BinaryOp::LessThanEqual => Cf::LessThanEqual,
        BinaryOp::GreaterThanEqual => Cf::GreaterThanEqual,
        BinaryOp::ShiftLeft => Cf::ShiftLeft,
        BinaryOp::ShiftRight => Cf::ShiftRight,
    }
}

/// Pick the constructor folding `args` into a value of type `ty`.
fn constructor(
    types: &crate::ty::Manager,
    ty: Handle<Type>,
    arg_types: &[Handle<Type>],
) -> constant::Function {
    use constant::Function as Cf;
    let all_scalars = arg_types.iter().all(|&t| types[t].is_scalar());
    match types[ty] {
        _ if arg_types.is_empty() => Cf::Zero,
        Type::Vector { .. } | Type::Matrix { .. } if arg_types == [ty] => Cf::Identity,
        Type::Vector { .. } if arg_types.len() == 1 => Cf::VecSplat,
        Type::Vector { .. } if all_scalars => Cf::VecInitS,
        Type::Vector { .. } => Cf::VecInitM,
        Type::Matrix { .. } if all_scalars => Cf::MatInitS,
        Type::Matrix { .. } => Cf::MatInitV,
        _ => Cf::ArrayOrStructInit,
    }
}

/// Run `function` with the given arguments, returning its result.
///
/// Warnings about numeric problems are added to `diagnostics`.
pub fn run(
    module: &mut Module,
    function: Handle<Function>,
    args: &[Handle<constant::Value>],
    diagnostics: &mut diag::List,
) -> Result<Handle<constant::Value>, InterpretError> {
    let Module {
        ref mut constants,
        ref values,
        ref instructions,
        ref blocks,
        ref functions,
        ..
    } = *module;
    let function = &functions[function];
    log::debug!("interpreting %{}", function.name);

    if args.len() != function.params.len() {
        return Err(InterpretError::ArgumentCount {
            expected: function.params.len(),
            found: args.len(),
        });
    }
    let mut env = FastHashMap::default();
    for (index, (&param, &arg)) in function.params.iter().zip(args).enumerate() {
        let expected = match values[param] {
            Value::FunctionParam { ty, .. } => ty,
            _ => unreachable!("{:?} is not a parameter", param),
        };
        let found = constants.ty(arg);
        if found != expected {
            return Err(InterpretError::ArgumentType {
                index,
                expected: constants.types.name(expected),
                found: constants.types.name(found),
            });
        }
        env.insert(param, arg);
    }

    let mut eval = Eval::with_runtime_semantics(constants, diagnostics);
    let span = Span::UNDEFINED;

    for &instruction in blocks[function.block].instructions.iter() {
        let inst = &instructions[instruction];
        let mut operands = Vec::with_capacity(inst.operands.len());
        for &operand in inst.operands.iter() {
            operands.push(match values[operand] {
                Value::Constant(value) => value,
                _ => *env
                    .get(&operand)
                    .ok_or(InterpretError::Undefined(operand))?,
            });
        }
        let ty = match inst.results.first() {
            Some(&result) => match values[result] {
                Value::InstructionResult { ty, .. } => ty,
                _ => unreachable!("{:?} is not a result", result),
            },
            None => {
                // Only `ret` has no result.
                return operands.first().copied().ok_or(InterpretError::NoReturn);
            }
        };

        let result = match inst.kind {
            InstructionKind::Binary(op) => {
                let mgr = eval.manager();
                let lhs = &mgr.types[mgr.ty(operands[0])];
                let rhs = &mgr.types[mgr.ty(operands[1])];
                let fun = binary_function(op, lhs, rhs);
                eval.evaluate(fun, ty, &[Some(operands[0]), Some(operands[1])], span)?
            }
            InstructionKind::Unary(op) => {
                let fun = match op {
                    UnaryOp::Complement => constant::Function::Complement,
                    UnaryOp::Negation => constant::Function::UnaryMinus,
                    UnaryOp::Not => constant::Function::Not,
                };
                eval.evaluate(fun, ty, &[Some(operands[0])], span)?
            }
            InstructionKind::Bitcast => eval.bitcast(ty, operands[0], span)?,
            InstructionKind::Convert => eval.convert(ty, operands[0], span)?,
            InstructionKind::Construct => {
                let mgr = eval.manager();
                let arg_types: Vec<_> = operands.iter().map(|&op| mgr.ty(op)).collect();
                let fun = constructor(&mgr.types, ty, &arg_types);
                let args: Vec<_> = operands.iter().copied().map(Some).collect();
                eval.evaluate(fun, ty, &args, span)?
            }
            InstructionKind::Access => {
                let mut value = Some(operands[0]);
                for &index in operands[1..].iter() {
                    value = match value {
                        Some(value) => eval.index(value, index, span)?,
                        None => None,
                    };
                }
                value
            }
            InstructionKind::Swizzle(ref indices) => eval.swizzle(ty, operands[0], indices, span)?,
            InstructionKind::Call(fun) if !fun.is_const() => {
                return Err(InterpretError::Unsupported(fun.name().to_string()))
            }
            InstructionKind::Call(fun) => {
                let args: Vec<_> = operands.iter().copied().map(Some).collect();
                eval.evaluate(constant::Function::Builtin(fun), ty, &args, span)?
            }
            InstructionKind::Return => unreachable!(),
        };
        let result_value = result.ok_or_else(|| InterpretError::Unsupported(describe(&inst.kind)))?;
        env.insert(inst.results[0], result_value);
    }

    Err(InterpretError::NoReturn)
}

fn describe(kind: &InstructionKind) -> String {
    match *kind {
        InstructionKind::Call(fun) => BuiltinFn::name(fun).to_string(),
        ref other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::Literal;
    use crate::ir::Builder;
    use crate::ty::{Scalar, VectorSize};

    /// `fn pick(a: f32, b: f32) -> f32 { return array(vec2(a, b), vec2(b, a))[index][1]; }`
    fn pick(index: i32) -> (Module, Handle<Function>) {
        let mut module = Module::new();
        let f32 = module.types().f32();
        let vec2 = module.types().vec(Scalar::F32, VectorSize::Bi);
        let pair = module.types().array(vec2, 2);
        let function = module.add_function("pick", &[f32, f32], Some(f32));
        let block = module[function].block();
        let [a, b] = [0, 1].map(|i| module[function].params()[i]);

        let mut builder = Builder::at_end(&mut module, block);
        let ab = builder.construct(vec2, &[a, b]);
        let ba = builder.construct(vec2, &[b, a]);
        let both = builder.construct(pair, &[ab, ba]);
        let outer = builder.i32(index);
        let inner = builder.u32(1);
        let element = builder.access(f32, both, &[outer, inner]);
        builder.ret(Some(element));
        (module, function)
    }

    #[test]
    fn access_through_nested_composites() {
        let (mut module, function) = pick(1);
        module.validate().unwrap();
        let args = [module.constants.f32(2.0), module.constants.f32(3.0)];
        let mut diagnostics = diag::List::new();
        let result = run(&mut module, function, &args, &mut diagnostics).unwrap();
        assert_eq!(module.constants.literal(result), Some(Literal::F32(2.0)));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn access_out_of_bounds_fails() {
        let (mut module, function) = pick(2);
        let args = [module.constants.f32(2.0), module.constants.f32(3.0)];
        let mut diagnostics = diag::List::new();
        match run(&mut module, function, &args, &mut diagnostics) {
            Err(InterpretError::Failed(Failure)) => {}
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            diagnostics.iter().next().unwrap().message,
            "index 2 out of bounds [0..1]"
        );
    }
}
