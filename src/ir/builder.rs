use super::{BinaryOp, Block, Instruction, InstructionKind, Module, UnaryOp, Value};
use crate::arena::Handle;
use crate::constant;
use crate::ty::{self, Scalar, Type};
use crate::BuiltinFn;

use arrayvec::ArrayVec;

/// Where a [`Builder`] puts the instructions it creates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertionPoint {
    /// Immediately before the instruction.
    Before(Handle<Instruction>),
    /// After the instruction. Each insertion moves the point past the new
    /// instruction, so consecutive insertions keep their order.
    After(Handle<Instruction>),
    /// At the end of the block.
    End(Handle<Block>),
}

/// Creates instructions and places them at an [`InsertionPoint`].
pub struct Builder<'m> {
    module: &'m mut Module,
    point: InsertionPoint,
}

impl<'m> Builder<'m> {
    pub fn new(module: &'m mut Module, point: InsertionPoint) -> Self {
        Builder { module, point }
    }

    pub fn before(module: &'m mut Module, anchor: Handle<Instruction>) -> Self {
        Self::new(module, InsertionPoint::Before(anchor))
    }

    pub fn after(module: &'m mut Module, anchor: Handle<Instruction>) -> Self {
        Self::new(module, InsertionPoint::After(anchor))
    }

    pub fn at_end(module: &'m mut Module, block: Handle<Block>) -> Self {
        Self::new(module, InsertionPoint::End(block))
    }

    pub fn module(&mut self) -> &mut Module {
        &mut *self.module
    }

    pub fn types(&mut self) -> &mut ty::Manager {
        &mut self.module.constants.types
    }

    pub fn value_type(&self, value: Handle<Value>) -> Handle<Type> {
        self.module.value_type(value)
    }

    fn insert(
        &mut self,
        kind: InstructionKind,
        operands: &[Handle<Value>],
        result_types: &[Handle<Type>],
    ) -> Handle<Instruction> {
        let instruction = self.module.create_instruction(kind, operands, result_types);
        match self.point {
            InsertionPoint::Before(anchor) => self.module.insert_before(anchor, instruction),
            InsertionPoint::After(anchor) => {
                self.module.insert_after(anchor, instruction);
                self.point = InsertionPoint::After(instruction);
            }
            InsertionPoint::End(block) => self.module.append(block, instruction),
        }
        instruction
    }

    fn insert_value(
        &mut self,
        kind: InstructionKind,
        operands: &[Handle<Value>],
        ty: Handle<Type>,
    ) -> Handle<Value> {
        let instruction = self.insert(kind, operands, &[ty]);
        self.module.instructions[instruction].results[0]
    }

    pub fn binary(
        &mut self,
        op: BinaryOp,
        ty: Handle<Type>,
        left: Handle<Value>,
        right: Handle<Value>,
    ) -> Handle<Value> {
        self.insert_value(InstructionKind::Binary(op), &[left, right], ty)
    }

    pub fn unary(&mut self, op: UnaryOp, ty: Handle<Type>, value: Handle<Value>) -> Handle<Value> {
        self.insert_value(InstructionKind::Unary(op), &[value], ty)
    }

    pub fn bitcast(&mut self, ty: Handle<Type>, value: Handle<Value>) -> Handle<Value> {
        self.insert_value(InstructionKind::Bitcast, &[value], ty)
    }

    pub fn convert(&mut self, ty: Handle<Type>, value: Handle<Value>) -> Handle<Value> {
        self.insert_value(InstructionKind::Convert, &[value], ty)
    }

    pub fn construct(&mut self, ty: Handle<Type>, args: &[Handle<Value>]) -> Handle<Value> {
        self.insert_value(InstructionKind::Construct, args, ty)
    }

    pub fn access(
        &mut self,
        ty: Handle<Type>,
        base: Handle<Value>,
        indices: &[Handle<Value>],
    ) -> Handle<Value> {
        let mut operands = Vec::with_capacity(1 + indices.len());
        operands.push(base);
        operands.extend_from_slice(indices);
        self.insert_value(InstructionKind::Access, &operands, ty)
    }

    pub fn swizzle(&mut self, ty: Handle<Type>, value: Handle<Value>, indices: &[u32]) -> Handle<Value> {
        let indices = indices.iter().copied().collect::<ArrayVec<u32, 4>>();
        self.insert_value(InstructionKind::Swizzle(indices), &[value], ty)
    }

    pub fn call(&mut self, ty: Handle<Type>, fun: BuiltinFn, args: &[Handle<Value>]) -> Handle<Value> {
        assert_eq!(args.len(), fun.argument_count(), "wrong number of arguments to {fun}");
        self.insert_value(InstructionKind::Call(fun), args, ty)
    }

    pub fn ret(&mut self, value: Option<Handle<Value>>) -> Handle<Instruction> {
        let operands: &[Handle<Value>] = match value {
            Some(ref value) => std::slice::from_ref(value),
            None => &[],
        };
        self.insert(InstructionKind::Return, operands, &[])
    }

    /// A constant operand.
    pub fn constant(&mut self, value: Handle<constant::Value>) -> Handle<Value> {
        self.module.constant(value)
    }

    pub fn u32(&mut self, value: u32) -> Handle<Value> {
        let value = self.module.constants.u32(value);
        self.constant(value)
    }

    pub fn i32(&mut self, value: i32) -> Handle<Value> {
        let value = self.module.constants.i32(value);
        self.constant(value)
    }

    pub fn f32(&mut self, value: f32) -> Handle<Value> {
        let value = self.module.constants.f32(value);
        self.constant(value)
    }

    /// A constant of type `ty`, a scalar or a vector, with every component
    /// equal to `literal`.
    pub fn splat(&mut self, ty: Handle<Type>, literal: constant::Literal) -> Handle<Value> {
        let element = self.module.constants.scalar(literal);
        let value = match self.module.constants.types[ty] {
            Type::Vector { size, .. } => self.module.constants.splat(ty, element, size as u32),
            _ => element,
        };
        self.constant(value)
    }

    /// The `u32` constant `value`, splatted to the vector width of `shape`.
    pub fn u32_like(&mut self, shape: Handle<Type>, value: u32) -> Handle<Value> {
        let ty = self.types().match_width(Scalar::U32, shape);
        self.splat(ty, constant::Literal::U32(value))
    }
}
