/*! A small SSA intermediate representation with explicit use-lists.

A [`Module`] owns every [`Value`], [`Instruction`], [`Block`] and
[`Function`] of a shader in arenas, together with a [`constant::Manager`]
holding types and constants.

Instructions consume values (their *operands*) and produce values (their
*results*). For every value, the module keeps the set of instructions using
it. An instruction appears at most once in a value's use set, however many of
its operand slots refer to that value. All operand mutations go through the
module so that the use sets stay exact:

- [`Module::set_operand`] swaps one operand slot.
- [`Module::replace_all_uses_with`] redirects every user of a value to another.
- [`Module::destroy`] removes an instruction, releasing its operands.

New instructions are created and placed with a [`Builder`].
!*/

pub mod builder;
mod disassemble;
pub mod interpret;
pub mod transform;
mod validate;

pub use builder::{Builder, InsertionPoint};
pub use validate::ValidationError;

use crate::arena::{Arena, Handle};
use crate::constant;
use crate::ty::Type;
use crate::{BuiltinFn, FastHashMap, FastIndexMap, FastIndexSet};

use arrayvec::ArrayVec;
use smallvec::SmallVec;
use std::ops;

/// Operator of a [`InstructionKind::Binary`] instruction.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    Xor,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanEqual,
    GreaterThanEqual,
    ShiftLeft,
    ShiftRight,
}

impl BinaryOp {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "sub",
            Self::Multiply => "mul",
            Self::Divide => "div",
            Self::Modulo => "mod",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Equal => "eq",
            Self::NotEqual => "neq",
            Self::LessThan => "lt",
            Self::GreaterThan => "gt",
            Self::LessThanEqual => "lte",
            Self::GreaterThanEqual => "gte",
            Self::ShiftLeft => "shl",
            Self::ShiftRight => "shr",
        }
    }
}

/// Operator of a [`InstructionKind::Unary`] instruction.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum UnaryOp {
    Complement,
    Negation,
    Not,
}

impl UnaryOp {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Complement => "complement",
            Self::Negation => "negation",
            Self::Not => "not",
        }
    }
}

/// A value instructions can use as an operand.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Constant(Handle<constant::Value>),
    /// A result of `instruction`.
    InstructionResult {
        instruction: Handle<Instruction>,
        ty: Handle<Type>,
    },
    /// Parameter `index` of `function`.
    FunctionParam {
        function: Handle<Function>,
        index: u32,
        ty: Handle<Type>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum InstructionKind {
    Binary(BinaryOp),
    Unary(UnaryOp),
    /// Reinterpret the bits of the operand.
    Bitcast,
    /// Value conversion of the operand.
    Convert,
    /// Build a composite from its operands, or its zero value without any.
    Construct,
    /// Index into the first operand with each of the remaining ones in turn.
    Access,
    /// Select components of a vector.
    Swizzle(ArrayVec<u32, 4>),
    Call(BuiltinFn),
    /// Return from the function, with the operand if there is one.
    Return,
}

impl InstructionKind {
    fn has_result(&self) -> bool {
        !matches!(*self, Self::Return)
    }
}

#[derive(Clone, Debug)]
pub struct Instruction {
    kind: InstructionKind,
    operands: SmallVec<[Handle<Value>; 4]>,
    results: SmallVec<[Handle<Value>; 1]>,
    block: Option<Handle<Block>>,
    alive: bool,
}

impl Instruction {
    pub const fn kind(&self) -> &InstructionKind {
        &self.kind
    }

    pub fn operands(&self) -> &[Handle<Value>] {
        &self.operands
    }

    pub fn results(&self) -> &[Handle<Value>] {
        &self.results
    }

    /// The single result of the instruction, if it has one.
    pub fn result(&self) -> Option<Handle<Value>> {
        self.results.first().copied()
    }

    /// The block the instruction is placed in.
    pub const fn block(&self) -> Option<Handle<Block>> {
        self.block
    }

    /// `false` once the instruction has been [destroyed](Module::destroy).
    pub const fn is_alive(&self) -> bool {
        self.alive
    }
}

/// An ordered list of instructions.
#[derive(Clone, Debug, Default)]
pub struct Block {
    instructions: Vec<Handle<Instruction>>,
}

impl Block {
    pub fn instructions(&self) -> &[Handle<Instruction>] {
        &self.instructions
    }
}

#[derive(Clone, Debug)]
pub struct Function {
    name: String,
    params: Vec<Handle<Value>>,
    return_type: Option<Handle<Type>>,
    block: Handle<Block>,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Handle<Value>] {
        &self.params
    }

    pub const fn return_type(&self) -> Option<Handle<Type>> {
        self.return_type
    }

    pub const fn block(&self) -> Handle<Block> {
        self.block
    }
}

/// A shader program in IR form.
#[derive(Debug, Default)]
pub struct Module {
    /// Types and constant values referred to by the IR.
    pub constants: constant::Manager,
    values: Arena<Value>,
    instructions: Arena<Instruction>,
    blocks: Arena<Block>,
    functions: Arena<Function>,
    uses: FastIndexMap<Handle<Value>, FastIndexSet<Handle<Instruction>>>,
    names: FastHashMap<Handle<Value>, String>,
}

impl ops::Index<Handle<Value>> for Module {
    type Output = Value;
    fn index(&self, handle: Handle<Value>) -> &Value {
        &self.values[handle]
    }
}

impl ops::Index<Handle<Instruction>> for Module {
    type Output = Instruction;
    fn index(&self, handle: Handle<Instruction>) -> &Instruction {
        &self.instructions[handle]
    }
}

impl ops::Index<Handle<Block>> for Module {
    type Output = Block;
    fn index(&self, handle: Handle<Block>) -> &Block {
        &self.blocks[handle]
    }
}

impl ops::Index<Handle<Function>> for Module {
    type Output = Function;
    fn index(&self, handle: Handle<Function>) -> &Function {
        &self.functions[handle]
    }
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(&mut self) -> &mut crate::ty::Manager {
        &mut self.constants.types
    }

    /// Add a function with parameters of the given types and an empty body.
    pub fn add_function(
        &mut self,
        name: &str,
        param_types: &[Handle<Type>],
        return_type: Option<Handle<Type>>,
    ) -> Handle<Function> {
        let block = self.blocks.append(Block::default());
        let function = self.functions.append(Function {
            name: name.to_string(),
            params: Vec::with_capacity(param_types.len()),
            return_type,
            block,
        });
        for (index, &ty) in param_types.iter().enumerate() {
            let param = self.values.append(Value::FunctionParam {
                function,
                index: index as u32,
                ty,
            });
            self.functions[function].params.push(param);
        }
        function
    }

    pub fn functions(&self) -> impl Iterator<Item = (Handle<Function>, &Function)> {
        self.functions.iter()
    }

    /// Every instruction ever created, including destroyed ones.
    pub fn instructions(&self) -> impl Iterator<Item = (Handle<Instruction>, &Instruction)> {
        self.instructions.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = (Handle<Value>, &Value)> {
        self.values.iter()
    }

    /// Wrap a constant as an operand.
    pub fn constant(&mut self, value: Handle<constant::Value>) -> Handle<Value> {
        self.values.append(Value::Constant(value))
    }

    pub fn value_type(&self, value: Handle<Value>) -> Handle<Type> {
        match self.values[value] {
            Value::Constant(constant) => self.constants.ty(constant),
            Value::InstructionResult { ty, .. } | Value::FunctionParam { ty, .. } => ty,
        }
    }

    pub fn name(&self, value: Handle<Value>) -> Option<&str> {
        self.names.get(&value).map(String::as_str)
    }

    pub fn set_name(&mut self, value: Handle<Value>, name: &str) {
        self.names.insert(value, name.to_string());
    }

    pub fn take_name(&mut self, value: Handle<Value>) -> Option<String> {
        self.names.remove(&value)
    }

    /// The instructions using `value`, each listed once.
    pub fn usages(&self, value: Handle<Value>) -> impl Iterator<Item = Handle<Instruction>> + '_ {
        self.uses
            .get(&value)
            .into_iter()
            .flat_map(|users| users.iter().copied())
    }

    pub fn use_count(&self, value: Handle<Value>) -> usize {
        self.uses.get(&value).map_or(0, |users| users.len())
    }

    pub(crate) fn use_table(&self) -> impl Iterator<Item = (Handle<Value>, &FastIndexSet<Handle<Instruction>>)> {
        self.uses.iter().map(|(&value, users)| (value, users))
    }

    fn add_use(&mut self, value: Handle<Value>, user: Handle<Instruction>) {
        self.uses.entry(value).or_default().insert(user);
    }

    fn remove_use(&mut self, value: Handle<Value>, user: Handle<Instruction>) {
        if let Some(users) = self.uses.get_mut(&value) {
            users.shift_remove(&user);
            if users.is_empty() {
                self.uses.shift_remove(&value);
            }
        }
    }

    /// Create an instruction outside of any block, with a result of each of
    /// `result_types`.
    pub(crate) fn create_instruction(
        &mut self,
        kind: InstructionKind,
        operands: &[Handle<Value>],
        result_types: &[Handle<Type>],
    ) -> Handle<Instruction> {
        assert_eq!(
            kind.has_result(),
            !result_types.is_empty(),
            "wrong results for {kind:?}"
        );
        let instruction = self.instructions.append(Instruction {
            kind,
            operands: operands.iter().copied().collect(),
            results: SmallVec::new(),
            block: None,
            alive: true,
        });
        for &operand in operands {
            self.add_use(operand, instruction);
        }
        for &ty in result_types {
            let result = self.values.append(Value::InstructionResult { instruction, ty });
            self.instructions[instruction].results.push(result);
        }
        instruction
    }

    fn place(&mut self, instruction: Handle<Instruction>, block: Handle<Block>) {
        let slot = &mut self.instructions[instruction].block;
        assert!(slot.is_none(), "{instruction:?} is already placed");
        *slot = Some(block);
    }

    fn anchor_position(&self, anchor: Handle<Instruction>) -> (Handle<Block>, usize) {
        let block = match self.instructions[anchor].block {
            Some(block) => block,
            None => panic!("{anchor:?} is not in a block"),
        };
        match self.blocks[block].instructions.iter().position(|&i| i == anchor) {
            Some(position) => (block, position),
            None => panic!("{anchor:?} is missing from its block"),
        }
    }

    pub(crate) fn insert_before(&mut self, anchor: Handle<Instruction>, instruction: Handle<Instruction>) {
        let (block, position) = self.anchor_position(anchor);
        self.place(instruction, block);
        self.blocks[block].instructions.insert(position, instruction);
    }

    pub(crate) fn insert_after(&mut self, anchor: Handle<Instruction>, instruction: Handle<Instruction>) {
        let (block, position) = self.anchor_position(anchor);
        self.place(instruction, block);
        self.blocks[block].instructions.insert(position + 1, instruction);
    }

    pub(crate) fn append(&mut self, block: Handle<Block>, instruction: Handle<Instruction>) {
        self.place(instruction, block);
        self.blocks[block].instructions.push(instruction);
    }

    /// Point operand `index` of `instruction` at `value`.
    pub fn set_operand(&mut self, instruction: Handle<Instruction>, index: usize, value: Handle<Value>) {
        let old = std::mem::replace(&mut self.instructions[instruction].operands[index], value);
        if old == value {
            return;
        }
        if !self.instructions[instruction].operands.contains(&old) {
            self.remove_use(old, instruction);
        }
        self.add_use(value, instruction);
    }

    /// Make every instruction using `old` use `new` instead.
    ///
    /// Afterwards `old` has no uses.
    pub fn replace_all_uses_with(&mut self, old: Handle<Value>, new: Handle<Value>) {
        if old == new {
            return;
        }
        let users = match self.uses.shift_remove(&old) {
            Some(users) => users,
            None => return,
        };
        for user in users {
            for operand in self.instructions[user].operands.iter_mut() {
                if *operand == old {
                    *operand = new;
                }
            }
            self.add_use(new, user);
        }
    }

    /// Remove `instruction` from its block and release its operands.
    ///
    /// # Panics
    ///
    /// If the instruction was already destroyed or one of its results is
    /// still in use.
    pub fn destroy(&mut self, instruction: Handle<Instruction>) {
        assert!(
            self.instructions[instruction].alive,
            "{instruction:?} destroyed twice"
        );
        for &result in self.instructions[instruction].results.iter() {
            assert_eq!(
                self.use_count(result),
                0,
                "destroying {instruction:?} while {result:?} is in use"
            );
        }
        log::trace!("destroying {:?}", instruction);

        if let Some(block) = self.instructions[instruction].block.take() {
            self.blocks[block].instructions.retain(|&i| i != instruction);
        }
        let operands = std::mem::take(&mut self.instructions[instruction].operands);
        for operand in operands {
            self.remove_use(operand, instruction);
        }
        let results = self.instructions[instruction].results.clone();
        for result in results {
            self.names.remove(&result);
        }
        self.instructions[instruction].alive = false;
    }

    /// Check the structural invariants of the module.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate::validate(self)
    }

    /// Render the module as text.
    pub fn disassemble(&self) -> String {
        disassemble::disassemble(self)
    }
}
