use crate::{ObjectError, OpCell, Opcode, OperandLayout, Operands, op_flags};

fn encode(cells: &[OpCell]) -> Vec<u8> {
    let mut out = Vec::new();
    for cell in cells {
        cell.encode(&mut out).unwrap();
    }
    out
}

#[test]
fn opcode_sizes() {
    assert_eq!(Opcode::Noop.size(), 1);
    assert_eq!(Opcode::I64.size(), 9);
    assert_eq!(Opcode::Chr.size(), 5);
    assert_eq!(Opcode::Synthetic.size(), 2);
    assert_eq!(Opcode::Load.size(), 6);
    assert_eq!(Opcode::CallStatic.size(), 8);
    assert_eq!(Opcode::Pick.size(), 3);
    assert_eq!(Opcode::Jump.size(), 3);
}

#[test]
fn opcode_from_u8() {
    assert_eq!(Opcode::from_u8(0x20), Some(Opcode::I64Add));
    assert_eq!(Opcode::from_u8(0x58), Some(Opcode::Raise));
    assert_eq!(Opcode::from_u8(0xFF), None);
    assert_eq!(Opcode::I64Add.mnemonic(), "I64_ADD");
    assert_eq!(Opcode::IfNotNil.layout(), OperandLayout::JumpI16);
}

#[test]
fn decode_sequence() {
    let code = encode(&[
        OpCell::new(Opcode::I64, Operands::I64(-7)),
        OpCell::new(Opcode::Chr, Operands::Chr('λ')),
        OpCell::new(
            Opcode::CallStatic,
            Operands::FlagsAddressPlacement {
                flags: op_flags::CALL_RECEIVER_FOLLOWS,
                address: 0x8000_0002,
                placement: 3,
            },
        ),
        OpCell::new(Opcode::Return, Operands::None),
    ]);
    assert_eq!(code.len(), 9 + 5 + 8 + 1);

    let first = OpCell::decode(&code, 0).unwrap();
    assert_eq!(first.operands, Operands::I64(-7));

    let second = OpCell::decode(&code, first.next_offset()).unwrap();
    assert_eq!(second.operands, Operands::Chr('λ'));

    let third = OpCell::decode(&code, second.next_offset()).unwrap();
    assert_eq!(third.opcode, Opcode::CallStatic);
    assert_eq!(
        third.operands,
        Operands::FlagsAddressPlacement {
            flags: 1,
            address: 0x8000_0002,
            placement: 3
        }
    );

    let last = OpCell::decode(&code, third.next_offset()).unwrap();
    assert_eq!(last.opcode, Opcode::Return);
    assert_eq!(last.offset, 22);
}

#[test]
fn jump_target_is_relative_to_next_instruction() {
    let code = encode(&[
        OpCell::new(Opcode::Noop, Operands::None),
        OpCell::new(Opcode::Jump, Operands::Jump(-4)),
    ]);
    let jump = OpCell::decode(&code, 1).unwrap();
    assert_eq!(jump.jump_target(), Some(0));

    let forward = OpCell {
        opcode: Opcode::IfTrue,
        operands: Operands::Jump(10),
        offset: 5,
    };
    assert_eq!(forward.jump_target(), Some(18));
}

#[test]
fn decode_errors() {
    let err = OpCell::decode(&[0xEE], 0).unwrap_err();
    assert!(matches!(err, ObjectError::InvalidOpcode { opcode: 0xEE, offset: 0 }));

    let err = OpCell::decode(&[Opcode::I64 as u8, 1, 2], 0).unwrap_err();
    assert!(matches!(err, ObjectError::TruncatedInstruction(0)));

    let err = OpCell::decode(&[], 0).unwrap_err();
    assert!(matches!(err, ObjectError::TruncatedInstruction(0)));

    let bad_char = [Opcode::Chr as u8, 0x00, 0xD8, 0x00, 0x00];
    let err = OpCell::decode(&bad_char, 0).unwrap_err();
    assert!(matches!(err, ObjectError::InvalidOperand(0)));
}

#[test]
fn encode_rejects_mismatched_operands() {
    let mut out = Vec::new();
    let cell = OpCell::new(Opcode::I64, Operands::None);
    assert!(cell.encode(&mut out).is_err());
    assert!(out.is_empty());
}

#[test]
fn new_flags_pack_type_and_call_flags() {
    let flags = op_flags::make_new_flags(op_flags::NEW_STRUCT, op_flags::CALL_RECEIVER_FOLLOWS);
    assert_eq!(flags, 0x41);
    assert_eq!(op_flags::new_type(flags), op_flags::NEW_STRUCT);
    assert_eq!(op_flags::call_flags(flags), op_flags::CALL_RECEIVER_FOLLOWS);
}
