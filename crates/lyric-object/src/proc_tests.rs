use crate::{
    INVALID_ADDRESS, LEXICAL_LOCAL, NO_PARENT_CHECK, ObjectError, OpCell, Opcode, Operands,
    PROC_HEADER_SIZE, ProcCheck, ProcException, ProcInfo, ProcLayout, ProcLexical, encode_proc,
};

fn code(cells: &[(Opcode, Operands)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (opcode, operands) in cells {
        OpCell::new(*opcode, *operands).encode(&mut out).unwrap();
    }
    out
}

#[test]
fn encode_then_parse_with_trailer() {
    let info = ProcInfo {
        num_arguments: 2,
        num_locals: 1,
        lexicals: vec![ProcLexical {
            activation_call: 4,
            target_offset: 0,
            lexical_target: LEXICAL_LOCAL,
        }],
        code: code(&[
            (Opcode::Nil, Operands::None),
            (Opcode::Raise, Operands::None),
            (Opcode::Pop, Operands::None),
            (Opcode::Return, Operands::None),
        ]),
        checks: vec![ProcCheck {
            interval_offset: 0,
            interval_size: 2,
            parent_check: NO_PARENT_CHECK,
            first_exception: 0,
            num_exceptions: 1,
        }],
        exceptions: vec![ProcException {
            exception_type: INVALID_ADDRESS,
            catch_offset: 2,
            catch_size: 1,
        }],
        cleanups: vec![],
    };

    // Leading padding proves offsets are absolute.
    let mut bytecode = vec![0xAA; 3];
    let offset = encode_proc(&info, &mut bytecode).unwrap();
    assert_eq!(offset, 3);

    let layout = ProcLayout::parse(&bytecode, offset).unwrap();
    assert_eq!(layout.num_arguments, 2);
    assert_eq!(layout.num_locals, 1);
    assert_eq!(layout.lexicals, info.lexicals);
    assert_eq!(layout.code_offset, 3 + PROC_HEADER_SIZE as u32 + 9);
    assert_eq!(layout.code_size, 4);
    assert_eq!(layout.size as usize, bytecode.len() - 3);
    assert_eq!(layout.checks, info.checks);
    assert_eq!(layout.exceptions, info.exceptions);

    let raise_ip = layout.code_offset + 1;
    let (index, check) = layout.innermost_check(raise_ip).unwrap();
    assert_eq!(index, 0);
    assert_eq!(layout.check_exceptions(check), &info.exceptions[..]);
    assert!(layout.innermost_check(layout.code_offset + 3).is_none());
}

#[test]
fn innermost_check_prefers_smallest_interval() {
    let info = ProcInfo {
        code: vec![Opcode::Noop as u8; 10],
        checks: vec![
            ProcCheck {
                interval_offset: 0,
                interval_size: 10,
                parent_check: NO_PARENT_CHECK,
                first_exception: 0,
                num_exceptions: 0,
            },
            ProcCheck {
                interval_offset: 4,
                interval_size: 2,
                parent_check: 0,
                first_exception: 0,
                num_exceptions: 0,
            },
        ],
        ..Default::default()
    };
    let mut bytecode = Vec::new();
    encode_proc(&info, &mut bytecode).unwrap();
    let layout = ProcLayout::parse(&bytecode, 0).unwrap();

    assert_eq!(layout.innermost_check(layout.code_offset + 5).unwrap().0, 1);
    assert_eq!(layout.innermost_check(layout.code_offset + 7).unwrap().0, 0);
}

#[test]
fn check_past_end_is_rejected() {
    let info = ProcInfo {
        code: vec![Opcode::Return as u8],
        checks: vec![ProcCheck {
            interval_offset: 0,
            interval_size: 5,
            parent_check: NO_PARENT_CHECK,
            first_exception: 0,
            num_exceptions: 0,
        }],
        ..Default::default()
    };
    let err = encode_proc(&info, &mut Vec::new()).unwrap_err();
    assert!(matches!(err, ObjectError::InvalidProc { .. }));
}

#[test]
fn truncated_proc_is_rejected() {
    let mut bytecode = Vec::new();
    encode_proc(&ProcInfo::default(), &mut bytecode).unwrap();
    bytecode.truncate(bytecode.len() - 1);

    let err = ProcLayout::parse(&bytecode, 0).unwrap_err();
    assert!(matches!(err, ObjectError::InvalidProc { offset: 0, .. }));
    assert!(ProcLayout::parse(&bytecode, 100).is_err());
}
