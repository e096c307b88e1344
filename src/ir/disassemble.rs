//! Textual form of a [`Module`], for tests and debugging.

use super::{InstructionKind, Module, Value};
use crate::arena::Handle;
use crate::constant::{self, Literal, ValueKind};
use crate::FastHashMap;

use std::fmt::Write as _;

const SWIZZLE_COMPONENTS: [char; 4] = ['x', 'y', 'z', 'w'];

/// Assigns `%name` or `%N` identifiers to non-constant values, in order of
/// definition.
struct Namer<'m> {
    module: &'m Module,
    ids: FastHashMap<Handle<Value>, String>,
    next_id: usize,
}

impl<'m> Namer<'m> {
    fn define(&mut self, value: Handle<Value>) -> String {
        let id = match self.module.name(value) {
            Some(name) => format!("%{name}"),
            None => {
                self.next_id += 1;
                format!("%{}", self.next_id)
            }
        };
        self.ids.insert(value, id.clone());
        id
    }

    fn operand(&self, value: Handle<Value>) -> String {
        match self.module[value] {
            Value::Constant(constant) => constant_text(&self.module.constants, constant),
            _ => match self.ids.get(&value) {
                Some(id) => id.clone(),
                None => format!("%undefined{}", value.index()),
            },
        }
    }
}

fn literal_text(literal: Literal) -> String {
    match literal {
        Literal::I32(v) => format!("{v}i"),
        Literal::U32(v) => format!("{v}u"),
        Literal::F32(_) => format!("{literal}f"),
        Literal::F16(_) => format!("{literal}h"),
        _ => literal.to_string(),
    }
}

fn constant_text(constants: &constant::Manager, value: Handle<constant::Value>) -> String {
    let ty = constants.types.name(constants.ty(value));
    match *constants[value].kind() {
        ValueKind::Scalar(literal) => literal_text(literal),
        ValueKind::Splat { element, .. } => {
            format!("{}({})", ty, constant_text(constants, element))
        }
        ValueKind::Composite(ref elements) => {
            let elements: Vec<_> = elements
                .iter()
                .map(|&el| constant_text(constants, el))
                .collect();
            format!("{}({})", ty, elements.join(", "))
        }
    }
}

pub(super) fn disassemble(module: &Module) -> String {
    let mut namer = Namer {
        module,
        ids: FastHashMap::default(),
        next_id: 0,
    };
    let types = &module.constants.types;
    let mut out = String::new();

    for (index, (_, function)) in module.functions.iter().enumerate() {
        if index != 0 {
            out.push('\n');
        }
        let params: Vec<_> = function
            .params
            .iter()
            .map(|&param| {
                let id = namer.define(param);
                format!("{}:{}", id, types.name(module.value_type(param)))
            })
            .collect();
        let return_type = match function.return_type {
            Some(ty) => types.name(ty),
            None => "void".to_string(),
        };
        let _ = writeln!(
            out,
            "%{} = func({}):{} {{",
            function.name,
            params.join(", "),
            return_type
        );

        for &instruction in module.blocks[function.block].instructions.iter() {
            let inst = &module.instructions[instruction];
            let mut operands: Vec<_> = inst.operands.iter().map(|&op| namer.operand(op)).collect();
            let opcode = match inst.kind {
                InstructionKind::Binary(op) => op.name(),
                InstructionKind::Unary(op) => op.name(),
                InstructionKind::Bitcast => "bitcast",
                InstructionKind::Convert => "convert",
                InstructionKind::Construct => "construct",
                InstructionKind::Access => "access",
                InstructionKind::Swizzle(ref indices) => {
                    operands.push(
                        indices
                            .iter()
                            .map(|&i| SWIZZLE_COMPONENTS.get(i as usize).copied().unwrap_or('?'))
                            .collect(),
                    );
                    "swizzle"
                }
                InstructionKind::Call(fun) => fun.name(),
                InstructionKind::Return => "ret",
            };

            out.push_str("  ");
            let results: Vec<_> = inst
                .results
                .iter()
                .map(|&result| {
                    let id = namer.define(result);
                    format!("{}:{}", id, types.name(module.value_type(result)))
                })
                .collect();
            if !results.is_empty() {
                let _ = write!(out, "{} = ", results.join(", "));
            }
            out.push_str(opcode);
            if !operands.is_empty() {
                let _ = write!(out, " {}", operands.join(", "));
            }
            out.push('\n');
        }
        out.push_str("}\n");
    }
    out
}
