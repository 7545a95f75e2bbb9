//! Textual form of instruction words.
//!
//! `disassemble` renders the datasheet mnemonics; `assemble` parses the
//! same form back. The two are exact inverses for every word that decodes:
//! `assemble(&disassemble(w, s), s) == Ok(w)`.

use std::error::Error;
use std::fmt;

use crate::instruction::{
    DecodeError, InSource, Instruction, JmpCondition, MovDestination, MovOperation, MovSource,
    OutDestination, SetDestination, SideSet, WaitSource,
};

/// Failure to parse a textual instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    UnknownMnemonic(String),
    MissingOperand,
    InvalidOperand(String),
    TrailingInput(String),
    Reserved(DecodeError),
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMnemonic(m) => write!(f, "unknown mnemonic: {m}"),
            Self::MissingOperand => write!(f, "missing operand"),
            Self::InvalidOperand(o) => write!(f, "invalid operand: {o}"),
            Self::TrailingInput(t) => write!(f, "trailing input: {t}"),
            Self::Reserved(e) => write!(f, "{e}"),
        }
    }
}

impl Error for AsmError {}

fn irq_index_display(index: u8) -> String {
    if index & 0x10 != 0 {
        format!("{}_rel", index & 0x3)
    } else {
        format!("{}", index & 0x7)
    }
}

fn mov_source_display(operation: MovOperation, source: MovSource) -> String {
    let src = match source {
        MovSource::Pins => "pins",
        MovSource::X => "x",
        MovSource::Y => "y",
        MovSource::Null => "null",
        MovSource::Status => "status",
        MovSource::Isr => "isr",
        MovSource::Osr => "osr",
    };
    match operation {
        MovOperation::None => src.to_string(),
        MovOperation::Invert => format!("!{src}"),
        MovOperation::Reverse => format!("::{src}"),
    }
}

/// Render an instruction word as assembler text.
#[must_use]
pub fn disassemble(word: u16, side_set: &SideSet) -> String {
    let Ok(inst) = Instruction::decode(word) else {
        return format!(".word {word:#06x}");
    };
    let (delay, side) = side_set.split(word);
    let body = match inst {
        Instruction::Jmp { condition, address } => {
            let cond = match condition {
                JmpCondition::Always => "",
                JmpCondition::XZero => "!x, ",
                JmpCondition::XNonZeroDec => "x--, ",
                JmpCondition::YZero => "!y, ",
                JmpCondition::YNonZeroDec => "y--, ",
                JmpCondition::XNotEqualY => "x!=y, ",
                JmpCondition::Pin => "pin, ",
                JmpCondition::OsrNotEmpty => "!osre, ",
            };
            format!("jmp {cond}{address}")
        }
        Instruction::Wait {
            polarity,
            source,
            index,
        } => {
            let pol = u8::from(polarity);
            match source {
                WaitSource::Gpio => format!("wait {pol} gpio {index}"),
                WaitSource::Pin => format!("wait {pol} pin {index}"),
                WaitSource::Irq => format!("wait {pol} irq {}", irq_index_display(index)),
            }
        }
        Instruction::In { source, bit_count } => {
            let src = match source {
                InSource::Pins => "pins",
                InSource::X => "x",
                InSource::Y => "y",
                InSource::Null => "null",
                InSource::Isr => "isr",
                InSource::Osr => "osr",
            };
            format!("in {src}, {bit_count}")
        }
        Instruction::Out {
            destination,
            bit_count,
        } => {
            let dst = match destination {
                OutDestination::Pins => "pins",
                OutDestination::X => "x",
                OutDestination::Y => "y",
                OutDestination::Null => "null",
                OutDestination::PinDirs => "pindirs",
                OutDestination::Pc => "pc",
                OutDestination::Isr => "isr",
                OutDestination::Exec => "exec",
            };
            format!("out {dst}, {bit_count}")
        }
        Instruction::Push { if_full, block } => format!(
            "push {}{}",
            if if_full { "iffull " } else { "" },
            if block { "block" } else { "noblock" }
        ),
        Instruction::Pull { if_empty, block } => format!(
            "pull {}{}",
            if if_empty { "ifempty " } else { "" },
            if block { "block" } else { "noblock" }
        ),
        Instruction::Mov {
            destination,
            operation,
            source,
        } => {
            let dst = match destination {
                MovDestination::Pins => "pins",
                MovDestination::X => "x",
                MovDestination::Y => "y",
                MovDestination::Exec => "exec",
                MovDestination::Pc => "pc",
                MovDestination::Isr => "isr",
                MovDestination::Osr => "osr",
            };
            format!("mov {dst}, {}", mov_source_display(operation, source))
        }
        Instruction::Irq { clear, wait, index } => {
            let mode = if clear {
                "clear "
            } else if wait {
                "wait "
            } else {
                ""
            };
            format!("irq {mode}{}", irq_index_display(index))
        }
        Instruction::Set { destination, data } => {
            let dst = match destination {
                SetDestination::Pins => "pins",
                SetDestination::X => "x",
                SetDestination::Y => "y",
                SetDestination::PinDirs => "pindirs",
            };
            format!("set {dst}, {data}")
        }
    };
    let mut text = body;
    if let Some(side) = side {
        text.push_str(&format!(" side {side}"));
    }
    if delay > 0 {
        text.push_str(&format!(" [{delay}]"));
    }
    text
}

fn parse_number(token: &str) -> Result<u32, AsmError> {
    token
        .parse()
        .map_err(|_| AsmError::InvalidOperand(token.to_string()))
}

fn parse_irq_index(token: &str) -> Result<u8, AsmError> {
    if let Some(num) = token.strip_suffix("_rel") {
        let n = parse_number(num)?;
        if n > 3 {
            return Err(AsmError::InvalidOperand(token.to_string()));
        }
        Ok(0x10 | n as u8)
    } else {
        let n = parse_number(token)?;
        if n > 7 {
            return Err(AsmError::InvalidOperand(token.to_string()));
        }
        Ok(n as u8)
    }
}

fn parse_bit_count(token: &str) -> Result<u32, AsmError> {
    let n = parse_number(token)?;
    if n == 0 || n > 32 {
        return Err(AsmError::InvalidOperand(token.to_string()));
    }
    Ok(n)
}

/// Strip a trailing ` side N` / ` [D]` suffix pair off the line.
fn split_suffix(line: &str) -> Result<(&str, Option<u8>, u8), AsmError> {
    let mut rest = line.trim();
    let mut delay = 0u8;
    if let Some(open) = rest.rfind('[') {
        let close = rest
            .rfind(']')
            .ok_or_else(|| AsmError::InvalidOperand(rest.to_string()))?;
        if close == rest.len() - 1 {
            let inside = &rest[open + 1..close];
            delay = parse_number(inside)? as u8;
            rest = rest[..open].trim_end();
        }
    }
    let mut side = None;
    if let Some(pos) = rest.rfind(" side ") {
        let value = rest[pos + " side ".len()..].trim();
        side = Some(parse_number(value)? as u8);
        rest = rest[..pos].trim_end();
    }
    Ok((rest, side, delay))
}

/// Parse one line of assembler text into an instruction word.
pub fn assemble(line: &str, side_set: &SideSet) -> Result<u16, AsmError> {
    let (body, side, delay) = split_suffix(line)?;
    let tokens: Vec<&str> = body
        .split([' ', '\t', ','])
        .filter(|t| !t.is_empty())
        .collect();
    let (&mnemonic, args) = tokens
        .split_first()
        .ok_or(AsmError::MissingOperand)?;

    let inst = match mnemonic {
        "jmp" => assemble_jmp(args)?,
        "wait" => assemble_wait(args)?,
        "in" => assemble_in(args)?,
        "out" => assemble_out(args)?,
        "push" => {
            let (if_full, block) = parse_fifo_flags(args, "iffull")?;
            Instruction::Push { if_full, block }
        }
        "pull" => {
            let (if_empty, block) = parse_fifo_flags(args, "ifempty")?;
            Instruction::Pull { if_empty, block }
        }
        "mov" => assemble_mov(args)?,
        "irq" => assemble_irq(args)?,
        "set" => assemble_set(args)?,
        other => return Err(AsmError::UnknownMnemonic(other.to_string())),
    };

    let word = inst.encode() | side_set.encode(delay, side);
    // Guard against operand combinations the encoding cannot express.
    Instruction::decode(word).map_err(AsmError::Reserved)?;
    Ok(word)
}

fn assemble_jmp(args: &[&str]) -> Result<Instruction, AsmError> {
    match args {
        [addr] => Ok(Instruction::Jmp {
            condition: JmpCondition::Always,
            address: parse_number(addr)? as u8 & 0x1F,
        }),
        [cond, addr] => {
            let condition = match *cond {
                "!x" => JmpCondition::XZero,
                "x--" => JmpCondition::XNonZeroDec,
                "!y" => JmpCondition::YZero,
                "y--" => JmpCondition::YNonZeroDec,
                "x!=y" => JmpCondition::XNotEqualY,
                "pin" => JmpCondition::Pin,
                "!osre" => JmpCondition::OsrNotEmpty,
                other => return Err(AsmError::InvalidOperand(other.to_string())),
            };
            Ok(Instruction::Jmp {
                condition,
                address: parse_number(addr)? as u8 & 0x1F,
            })
        }
        [] => Err(AsmError::MissingOperand),
        [_, _, extra, ..] => Err(AsmError::TrailingInput((*extra).to_string())),
    }
}

fn assemble_wait(args: &[&str]) -> Result<Instruction, AsmError> {
    let [pol, src, index] = args else {
        return Err(AsmError::MissingOperand);
    };
    let polarity = match *pol {
        "0" => false,
        "1" => true,
        other => return Err(AsmError::InvalidOperand(other.to_string())),
    };
    let (source, index) = match *src {
        "gpio" => (WaitSource::Gpio, parse_number(index)? as u8 & 0x1F),
        "pin" => (WaitSource::Pin, parse_number(index)? as u8 & 0x1F),
        "irq" => (WaitSource::Irq, parse_irq_index(index)?),
        other => return Err(AsmError::InvalidOperand(other.to_string())),
    };
    Ok(Instruction::Wait {
        polarity,
        source,
        index,
    })
}

fn assemble_in(args: &[&str]) -> Result<Instruction, AsmError> {
    let [src, count] = args else {
        return Err(AsmError::MissingOperand);
    };
    let source = match *src {
        "pins" => InSource::Pins,
        "x" => InSource::X,
        "y" => InSource::Y,
        "null" => InSource::Null,
        "isr" => InSource::Isr,
        "osr" => InSource::Osr,
        other => return Err(AsmError::InvalidOperand(other.to_string())),
    };
    Ok(Instruction::In {
        source,
        bit_count: parse_bit_count(count)?,
    })
}

fn assemble_out(args: &[&str]) -> Result<Instruction, AsmError> {
    let [dst, count] = args else {
        return Err(AsmError::MissingOperand);
    };
    let destination = match *dst {
        "pins" => OutDestination::Pins,
        "x" => OutDestination::X,
        "y" => OutDestination::Y,
        "null" => OutDestination::Null,
        "pindirs" => OutDestination::PinDirs,
        "pc" => OutDestination::Pc,
        "isr" => OutDestination::Isr,
        "exec" => OutDestination::Exec,
        other => return Err(AsmError::InvalidOperand(other.to_string())),
    };
    Ok(Instruction::Out {
        destination,
        bit_count: parse_bit_count(count)?,
    })
}

fn parse_fifo_flags(args: &[&str], modifier: &str) -> Result<(bool, bool), AsmError> {
    match args {
        [] => Ok((false, true)),
        [b] if *b == "block" => Ok((false, true)),
        [b] if *b == "noblock" => Ok((false, false)),
        [m] if *m == modifier => Ok((true, true)),
        [m, b] if *m == modifier && *b == "block" => Ok((true, true)),
        [m, b] if *m == modifier && *b == "noblock" => Ok((true, false)),
        [other, ..] => Err(AsmError::InvalidOperand((*other).to_string())),
    }
}

fn assemble_mov(args: &[&str]) -> Result<Instruction, AsmError> {
    let [dst, src] = args else {
        return Err(AsmError::MissingOperand);
    };
    let destination = match *dst {
        "pins" => MovDestination::Pins,
        "x" => MovDestination::X,
        "y" => MovDestination::Y,
        "exec" => MovDestination::Exec,
        "pc" => MovDestination::Pc,
        "isr" => MovDestination::Isr,
        "osr" => MovDestination::Osr,
        other => return Err(AsmError::InvalidOperand(other.to_string())),
    };
    let (operation, src) = if let Some(s) = src.strip_prefix("::") {
        (MovOperation::Reverse, s)
    } else if let Some(s) = src.strip_prefix('!') {
        (MovOperation::Invert, s)
    } else if let Some(s) = src.strip_prefix('~') {
        (MovOperation::Invert, s)
    } else {
        (MovOperation::None, *src)
    };
    let source = match src {
        "pins" => MovSource::Pins,
        "x" => MovSource::X,
        "y" => MovSource::Y,
        "null" => MovSource::Null,
        "status" => MovSource::Status,
        "isr" => MovSource::Isr,
        "osr" => MovSource::Osr,
        other => return Err(AsmError::InvalidOperand(other.to_string())),
    };
    Ok(Instruction::Mov {
        destination,
        operation,
        source,
    })
}

fn assemble_irq(args: &[&str]) -> Result<Instruction, AsmError> {
    let (clear, wait, index) = match args {
        [index] => (false, false, index),
        [mode, index] => match *mode {
            "clear" => (true, false, index),
            "wait" => (false, true, index),
            "set" | "nowait" => (false, false, index),
            other => return Err(AsmError::InvalidOperand(other.to_string())),
        },
        [] => return Err(AsmError::MissingOperand),
        [_, _, extra, ..] => return Err(AsmError::TrailingInput((*extra).to_string())),
    };
    Ok(Instruction::Irq {
        clear,
        wait,
        index: parse_irq_index(index)?,
    })
}

fn assemble_set(args: &[&str]) -> Result<Instruction, AsmError> {
    let [dst, data] = args else {
        return Err(AsmError::MissingOperand);
    };
    let destination = match *dst {
        "pins" => SetDestination::Pins,
        "x" => SetDestination::X,
        "y" => SetDestination::Y,
        "pindirs" => SetDestination::PinDirs,
        other => return Err(AsmError::InvalidOperand(other.to_string())),
    };
    let value = parse_number(data)?;
    if value > 31 {
        return Err(AsmError::InvalidOperand((*data).to_string()));
    }
    Ok(Instruction::Set {
        destination,
        data: value as u8,
    })
}
