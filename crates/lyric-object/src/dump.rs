//! Human-readable object dump for debugging and snapshot tests.

use std::fmt::Write as _;

use super::address::{Address, INVALID_ADDRESS, is_far, is_near};
use super::descriptors::{LiteralDescriptor, TypeDescriptor, TypeKind};
use super::instruction::{OpCell, Operands};
use super::object::LyricObject;

/// Render an object as text.
pub fn dump(object: &LyricObject) -> String {
    let mut out = String::new();
    dump_symbols(&mut out, object);
    dump_imports(&mut out, object);
    dump_types(&mut out, object);
    dump_literals(&mut out, object);
    dump_calls(&mut out, object);
    out
}

fn string(object: &LyricObject, id: lyric_common::StringId) -> &str {
    object.string(id).unwrap_or("<invalid>")
}

fn address(addr: Address) -> String {
    if addr == INVALID_ADDRESS {
        "-".to_owned()
    } else if is_far(addr) {
        format!("L{}", addr & 0x7FFF_FFFF)
    } else {
        format!("#{addr}")
    }
}

fn dump_symbols(out: &mut String, object: &LyricObject) {
    writeln!(out, "[symbols]").unwrap();
    for symbol in object.symbols() {
        writeln!(
            out,
            "{} = {} #{}",
            string(object, symbol.path),
            symbol.section,
            symbol.index
        )
        .unwrap();
    }
}

fn dump_imports(out: &mut String, object: &LyricObject) {
    if object.imports().is_empty() {
        return;
    }
    writeln!(out, "\n[imports]").unwrap();
    for (i, import) in object.imports().iter().enumerate() {
        writeln!(
            out,
            "I{i} {} flags={:#04x}",
            string(object, import.location),
            import.flags.bits()
        )
        .unwrap();
    }
    writeln!(out, "\n[links]").unwrap();
    for (i, link) in object.links().iter().enumerate() {
        writeln!(
            out,
            "L{i} I{}#{} ({})",
            link.import,
            string(object, link.path),
            link.section
        )
        .unwrap();
    }
}

fn render_type(object: &LyricObject, index: u32, depth: usize) -> String {
    let types = &object.tables().types;
    let Some(TypeDescriptor { kind, url, members }) = types.get(index as usize) else {
        return "<invalid>".to_owned();
    };
    if depth > 16 {
        return "...".to_owned();
    }
    let url = url.map(|u| string(object, u)).unwrap_or("?");
    let join = |sep: &str| {
        members
            .iter()
            .map(|m| render_type(object, *m, depth + 1))
            .collect::<Vec<_>>()
            .join(sep)
    };
    match kind {
        TypeKind::Concrete if members.is_empty() => url.to_owned(),
        TypeKind::Concrete => format!("{url}[{}]", join(", ")),
        TypeKind::Placeholder => format!("{url}${}", members.first().copied().unwrap_or(0)),
        TypeKind::Union => join(" | "),
        TypeKind::Intersection => join(" & "),
        TypeKind::SelfType => "Self".to_owned(),
        TypeKind::NoReturn => "NoReturn".to_owned(),
    }
}

fn dump_types(out: &mut String, object: &LyricObject) {
    let types = &object.tables().types;
    if types.is_empty() {
        return;
    }
    writeln!(out, "\n[types]").unwrap();
    for i in 0..types.len() as u32 {
        writeln!(out, "T{i} {}", render_type(object, i, 0)).unwrap();
    }
}

fn dump_literals(out: &mut String, object: &LyricObject) {
    let literals = &object.tables().literals;
    if literals.is_empty() {
        return;
    }
    writeln!(out, "\n[literals]").unwrap();
    for (i, literal) in literals.iter().enumerate() {
        let text = match literal {
            LiteralDescriptor::Nil => "nil".to_owned(),
            LiteralDescriptor::Undef => "undef".to_owned(),
            LiteralDescriptor::Bool(b) => b.to_string(),
            LiteralDescriptor::I64(v) => v.to_string(),
            LiteralDescriptor::Dbl(v) => format!("{v:?}"),
            LiteralDescriptor::Chr(c) => format!("{c:?}"),
            LiteralDescriptor::Utf8(s) => format!("{:?}", string(object, *s)),
        };
        writeln!(out, "K{i} {text}").unwrap();
    }
}

fn dump_calls(out: &mut String, object: &LyricObject) {
    let calls = &object.tables().calls;
    if calls.is_empty() {
        return;
    }
    writeln!(out, "\n[calls]").unwrap();
    for (i, call) in calls.iter().enumerate() {
        let result = render_type(object, call.result_type, 0);
        writeln!(
            out,
            "C{i} {} ({} params) -> {result}",
            string(object, call.path),
            call.parameters.len()
        )
        .unwrap();
        let layout = match object.proc(call.proc_offset) {
            Ok(layout) => layout,
            Err(e) => {
                writeln!(out, "  <{e}>").unwrap();
                continue;
            }
        };
        writeln!(
            out,
            "  args={} locals={} lexicals={} checks={}",
            layout.num_arguments,
            layout.num_locals,
            layout.lexicals.len(),
            layout.checks.len()
        )
        .unwrap();
        for cell in object.iter_proc(&layout) {
            match cell {
                Ok(cell) => {
                    let rel = cell.offset - layout.code_offset;
                    writeln!(out, "  {rel:04} {}", format_op(&cell, layout.code_offset)).unwrap();
                }
                Err(e) => {
                    writeln!(out, "  <{e}>").unwrap();
                    break;
                }
            }
        }
    }
}

/// Format one instruction; jump targets are shown relative to `code_offset`.
pub fn format_op(cell: &OpCell, code_offset: u32) -> String {
    let name = cell.opcode.mnemonic();
    match cell.operands {
        Operands::None => name.to_owned(),
        Operands::I64(v) => format!("{name} {v}"),
        Operands::Dbl(v) => format!("{name} {v:?}"),
        Operands::Chr(c) => format!("{name} {c:?}"),
        Operands::Address(a) => format!("{name} {}", address(a)),
        Operands::Type(t) => format!("{name} {t}"),
        Operands::FlagsAddress { flags, address: a } => {
            format!("{name} {flags:#04x} {}", address(a))
        }
        Operands::FlagsAddressPlacement {
            flags,
            address: a,
            placement,
        } => format!("{name} {flags:#04x} {} {placement}", address(a)),
        Operands::Offset(o) => format!("{name} {o}"),
        Operands::Jump(_) => match cell.jump_target() {
            Some(target) if is_near(target) => {
                format!("{name} @{:04}", target.saturating_sub(code_offset))
            }
            _ => format!("{name} @?"),
        },
    }
}
