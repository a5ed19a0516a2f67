use std::collections::HashMap;

use lyric_common::SymbolUrl;
use lyric_object::{Address, BytecodeIterator, Opcode, Operands, link_address};

use crate::test_utils::url;
use crate::{CodeFragment, Label, LiteralValue, OperandResolver, PendingOperand, Result};

#[derive(Default)]
struct MapResolver {
    symbols: HashMap<SymbolUrl, Address>,
    literals: Vec<LiteralValue>,
}

impl OperandResolver for MapResolver {
    fn symbol_address(&mut self, url: &SymbolUrl) -> Result<Address> {
        self.symbols
            .get(url)
            .copied()
            .ok_or_else(|| crate::AssemblerError::MissingSymbol(url.clone()))
    }

    fn literal_address(&mut self, literal: &LiteralValue) -> Result<Address> {
        if let Some(i) = self.literals.iter().position(|l| l == literal) {
            return Ok(i as Address);
        }
        self.literals.push(literal.clone());
        Ok(self.literals.len() as Address - 1)
    }
}

fn decode(code: &[u8]) -> Vec<(u32, Opcode, Operands)> {
    BytecodeIterator::new(code, 0, code.len() as u32)
        .map(|cell| {
            let cell = cell.unwrap();
            (cell.offset, cell.opcode, cell.operands)
        })
        .collect()
}

#[test]
fn backward_jump_is_relative_to_next_instruction() {
    let mut code = CodeFragment::new();
    let top = Label(0);
    code.place_label(top);
    code.emit(Opcode::Nil);
    code.emit_jump(Opcode::Jump, top);

    let assembled = code.assemble(&mut MapResolver::default()).unwrap();

    assert_eq!(assembled.labels[&top], 0);
    assert_eq!(
        decode(&assembled.code),
        vec![
            (0, Opcode::Nil, Operands::None),
            (1, Opcode::Jump, Operands::Jump(-4)),
        ]
    );
}

#[test]
fn forward_jump_over_nested_fragment() {
    let mut code = CodeFragment::new();
    let end = Label(7);
    code.emit(Opcode::True);
    code.emit_jump(Opcode::IfTrue, end);
    let mut inner = CodeFragment::new();
    inner.emit_with(Opcode::I64, PendingOperand::I64(1));
    inner.emit(Opcode::Pop);
    code.append_fragment(inner);
    code.place_label(end);
    code.emit(Opcode::Return);

    let assembled = code.assemble(&mut MapResolver::default()).unwrap();
    let ops = decode(&assembled.code);

    // TRUE(1) IF_TRUE(3) I64(9) POP(1)
    assert_eq!(assembled.labels[&end], 14);
    assert_eq!(ops[1], (1, Opcode::IfTrue, Operands::Jump(10)));
    assert_eq!(ops.last().unwrap().1, Opcode::Return);
}

#[test]
fn symbols_and_literals_resolve_through_resolver() {
    let target = url("/m#f");
    let mut resolver = MapResolver::default();
    resolver.symbols.insert(target.clone(), link_address(2));

    let mut code = CodeFragment::new();
    code.emit_with(Opcode::Literal, PendingOperand::Literal(LiteralValue::Utf8("hi".into())));
    code.emit_with(Opcode::Literal, PendingOperand::Literal(LiteralValue::Utf8("hi".into())));
    code.emit_with(
        Opcode::CallStatic,
        PendingOperand::Invoke {
            flags: 0,
            url: target.clone(),
            placement: 2,
        },
    );
    code.emit(Opcode::Return);

    let ops = decode(&code.assemble(&mut resolver).unwrap().code);

    assert_eq!(resolver.literals.len(), 1);
    assert_eq!(ops[0].2, Operands::Address(0));
    assert_eq!(ops[1].2, Operands::Address(0));
    assert_eq!(
        ops[2].2,
        Operands::FlagsAddressPlacement {
            flags: 0,
            address: link_address(2),
            placement: 2
        }
    );
    assert_eq!(code.symbol_references(), vec![&target]);
}

#[test]
fn unplaced_label_fails() {
    let mut code = CodeFragment::new();
    code.emit_jump(Opcode::Jump, Label(3));

    assert!(code.assemble(&mut MapResolver::default()).unwrap_err().is_invariant());
}

#[test]
fn label_placed_twice_fails() {
    let mut code = CodeFragment::new();
    code.place_label(Label(0));
    code.emit(Opcode::Nil);
    code.place_label(Label(0));

    assert!(code.assemble(&mut MapResolver::default()).unwrap_err().is_invariant());
}

#[test]
fn emptiness_ignores_labels() {
    let mut code = CodeFragment::new();
    code.place_label(Label(0));
    code.append_fragment(CodeFragment::new());
    assert!(code.is_empty());
    assert_eq!(code.last_opcode(), None);

    let mut inner = CodeFragment::new();
    inner.emit(Opcode::Halt);
    code.append_fragment(inner);
    assert!(!code.is_empty());
    assert_eq!(code.last_opcode(), Some(Opcode::Halt));
}
