use super::{Block, Instruction, InstructionKind, Module, Value};
use crate::arena::{BadHandle, Handle};

#[derive(Clone, Debug, thiserror::Error)]
#[cfg_attr(test, derive(PartialEq))]
pub enum ValidationError {
    #[error(transparent)]
    BadHandle(#[from] BadHandle),
    #[error("{user:?} uses the result of the destroyed {producer:?}")]
    DeadOperand {
        user: Handle<Instruction>,
        producer: Handle<Instruction>,
    },
    #[error("{user:?} uses {value:?}, but is missing from its uses")]
    MissingUse {
        value: Handle<Value>,
        user: Handle<Instruction>,
    },
    #[error("{value:?} lists {user:?} as a user, but it has no such operand")]
    StaleUse {
        value: Handle<Value>,
        user: Handle<Instruction>,
    },
    #[error("{value:?} claims to be a result of {instruction:?}")]
    ForeignResult {
        value: Handle<Value>,
        instruction: Handle<Instruction>,
    },
    #[error("{instruction:?} in {block:?} has been destroyed")]
    DeadInstruction {
        instruction: Handle<Instruction>,
        block: Handle<Block>,
    },
    #[error("{instruction:?} is listed in {block:?} but belongs to {actual:?}")]
    WrongBlock {
        instruction: Handle<Instruction>,
        block: Handle<Block>,
        actual: Option<Handle<Block>>,
    },
    #[error("{instruction:?} calls {fun} with {count} arguments")]
    ArgumentCount {
        instruction: Handle<Instruction>,
        fun: crate::BuiltinFn,
        count: usize,
    },
}

pub(super) fn validate(module: &Module) -> Result<(), ValidationError> {
    for (_, function) in module.functions.iter() {
        let block = function.block;
        module.blocks.check_contains_handle(block)?;
        for &instruction in module.blocks[block].instructions.iter() {
            module.instructions.check_contains_handle(instruction)?;
            let inst = &module.instructions[instruction];
            if !inst.alive {
                return Err(ValidationError::DeadInstruction { instruction, block });
            }
            if inst.block != Some(block) {
                return Err(ValidationError::WrongBlock {
                    instruction,
                    block,
                    actual: inst.block,
                });
            }
        }
    }

    for (instruction, inst) in module.instructions.iter() {
        for &result in inst.results.iter() {
            module.values.check_contains_handle(result)?;
            match module.values[result] {
                Value::InstructionResult { instruction: owner, .. } if owner == instruction => {}
                _ => {
                    return Err(ValidationError::ForeignResult {
                        value: result,
                        instruction,
                    })
                }
            }
        }
        if !inst.alive {
            continue;
        }
        if let InstructionKind::Call(fun) = inst.kind {
            if inst.operands.len() != fun.argument_count() {
                return Err(ValidationError::ArgumentCount {
                    instruction,
                    fun,
                    count: inst.operands.len(),
                });
            }
        }
        for &operand in inst.operands.iter() {
            module.values.check_contains_handle(operand)?;
            if let Value::InstructionResult { instruction: producer, .. } = module.values[operand] {
                module.instructions.check_contains_handle(producer)?;
                if !module.instructions[producer].alive {
                    return Err(ValidationError::DeadOperand {
                        user: instruction,
                        producer,
                    });
                }
            }
            let listed = module
                .uses
                .get(&operand)
                .map_or(false, |users| users.contains(&instruction));
            if !listed {
                return Err(ValidationError::MissingUse {
                    value: operand,
                    user: instruction,
                });
            }
        }
    }

    for (value, users) in module.use_table() {
        for &user in users.iter() {
            module.instructions.check_contains_handle(user)?;
            let inst = &module.instructions[user];
            if !inst.alive || !inst.operands.contains(&value) {
                return Err(ValidationError::StaleUse { value, user });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, Builder};

    #[test]
    fn stale_use() {
        let mut module = Module::new();
        let u32 = module.types().u32();
        let function = module.add_function("f", &[u32, u32], Some(u32));
        let block = module[function].block();
        let x = module[function].params()[0];
        let y = module[function].params()[1];
        let sum = Builder::at_end(&mut module, block).binary(BinaryOp::Add, u32, x, x);
        let add = match module[sum] {
            Value::InstructionResult { instruction, .. } => instruction,
            _ => unreachable!(),
        };
        module.validate().unwrap();

        // Bypass `set_operand` to break the use lists.
        module.instructions[add].operands[0] = y;
        assert_eq!(
            module.validate(),
            Err(ValidationError::MissingUse { value: y, user: add })
        );
        module.instructions[add].operands[1] = y;
        module.add_use(y, add);
        assert_eq!(
            module.validate(),
            Err(ValidationError::StaleUse { value: x, user: add })
        );
    }

    #[test]
    fn dead_operand() {
        let mut module = Module::new();
        let u32 = module.types().u32();
        let function = module.add_function("f", &[u32], Some(u32));
        let block = module[function].block();
        let x = module[function].params()[0];
        let mut b = Builder::at_end(&mut module, block);
        let sum = b.binary(BinaryOp::Add, u32, x, x);
        let ret = b.ret(Some(sum));
        let add = module[sum].clone();
        let add = match add {
            Value::InstructionResult { instruction, .. } => instruction,
            _ => unreachable!(),
        };

        module.instructions[add].alive = false;
        assert_eq!(
            module.validate(),
            Err(ValidationError::DeadInstruction {
                instruction: add,
                block
            })
        );
        module.blocks[block].instructions.retain(|&i| i != add);
        assert_eq!(
            module.validate(),
            Err(ValidationError::DeadOperand {
                user: ret,
                producer: add
            })
        );
    }
}
