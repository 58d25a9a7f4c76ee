//! Two-pass textual assembler (§4.D): pass one tokenizes and validates
//! every line, collecting line-numbered errors; pass two encodes the
//! validated lines into 32-bit binary rows and `address` directives.

use crate::error::{Result, SimError};

/// A validated, not-yet-encoded source line.
enum ParsedLine {
    Address { value: u32 },
    Instruction {
        mnemonic: String,
        operands: Vec<Operand>,
    },
}

#[derive(Clone, Copy)]
enum Operand {
    Register(u8),
    Immediate(u32),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OperandKind {
    Reg,
    Imm,
}

impl Operand {
    fn kind(self) -> OperandKind {
        match self {
            Operand::Register(_) => OperandKind::Reg,
            Operand::Immediate(_) => OperandKind::Imm,
        }
    }
}

/// The operand shape a mnemonic requires, by type from the §4.D table.
/// `None` means the mnemonic is not in the opcode table at all.
fn mnemonic_shape(mnemonic: &str) -> Option<&'static [OperandKind]> {
    use OperandKind::{Imm, Reg};
    match mnemonic {
        "HALT" | "NOP" => Some(&[]),
        "ADD" | "SUB" | "XOR" | "OR" | "AND" | "ASL" | "ASR" | "LSL" | "LSR" | "MUL" | "DIV"
        | "MOD" | "NOTBIT" => Some(&[Reg, Reg, Reg]),
        "NOT" | "PASSNOTA" | "COPY" | "PASSA" | "INC" | "DEC" | "LOAD" | "STORE" => {
            Some(&[Reg, Reg])
        }
        "ZEROS" | "JR" => Some(&[Reg]),
        "LCLH" | "LCLL" | "MOVI" => Some(&[Reg, Imm]),
        "BEQ" | "BNE" => Some(&[Reg, Reg, Imm]),
        "J" | "JAL" => Some(&[Imm]),
        _ => None,
    }
}

/// Encodes UFLA-RISC assembly source into the loader's binary-row format.
pub struct Assembler {
    strict: bool,
}

impl Assembler {
    pub fn new() -> Self {
        Self { strict: true }
    }

    /// When `false`, immediates may also be written as a bare, unprefixed
    /// string of `0`/`1` characters (the tolerant variant from one revision
    /// of the source). Defaults to `true` (the RECOMMENDED strict rule,
    /// §9): only decimal or `0b`-prefixed binary literals are accepted.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn assemble(&self, source: &str) -> Result<String> {
        let parsed = self.parse(source)?;
        Ok(self.encode(&parsed))
    }

    fn parse(&self, source: &str) -> Result<Vec<ParsedLine>> {
        let mut out = Vec::new();
        for (idx, raw) in source.lines().enumerate() {
            let line = idx + 1;
            let text = strip_comment(raw).trim();
            if text.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = text
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|t| !t.is_empty())
                .collect();
            let Some((head, rest)) = tokens.split_first() else {
                continue;
            };
            if head.eq_ignore_ascii_case("address") {
                let Some(bits) = rest.first() else {
                    return Err(parse_err(line, "address directive requires a value"));
                };
                let value = parse_bit_string(bits).ok_or_else(|| {
                    parse_err(line, format!("invalid address bit string '{}'", bits))
                })?;
                out.push(ParsedLine::Address { value });
                continue;
            }
            let mnemonic = head.to_ascii_uppercase();
            let shape = mnemonic_shape(&mnemonic)
                .ok_or_else(|| parse_err(line, format!("unknown mnemonic '{}'", head)))?;
            let operands = rest
                .iter()
                .map(|tok| self.parse_operand(tok, line))
                .collect::<Result<Vec<_>>>()?;
            if operands.len() != shape.len() {
                return Err(parse_err(
                    line,
                    format!(
                        "'{}' expects {} operand(s), found {}",
                        mnemonic,
                        shape.len(),
                        operands.len()
                    ),
                ));
            }
            for (i, (operand, expected)) in operands.iter().zip(shape.iter()).enumerate() {
                if operand.kind() != *expected {
                    return Err(parse_err(
                        line,
                        format!("operand {} to '{}' has the wrong kind", i + 1, mnemonic),
                    ));
                }
            }
            out.push(ParsedLine::Instruction { mnemonic, operands });
        }
        Ok(out)
    }

    fn parse_operand(&self, token: &str, line: usize) -> Result<Operand> {
        if let Some(digits) = token
            .strip_prefix('r')
            .or_else(|| token.strip_prefix('R'))
        {
            if let Ok(n) = digits.parse::<u8>() {
                if (n as usize) < crate::registers::REGISTER_COUNT {
                    return Ok(Operand::Register(n));
                }
            }
            return Err(parse_err(line, format!("invalid register operand '{}'", token)));
        }
        if let Some(bits) = token.strip_prefix("0b").or_else(|| token.strip_prefix("0B")) {
            return u32::from_str_radix(bits, 2)
                .map(Operand::Immediate)
                .map_err(|_| parse_err(line, format!("invalid binary literal '{}'", token)));
        }
        // Tolerant mode (§9 open question): a bare 0/1 string is read as
        // binary rather than decimal, matching the source revision that
        // accepted it unprefixed. Strict mode requires the `0b` prefix and
        // reads the same token as decimal instead.
        if !self.strict {
            if let Some(value) = parse_bit_string(token) {
                return Ok(Operand::Immediate(value));
            }
        }
        if let Ok(n) = token.parse::<i64>() {
            return Ok(Operand::Immediate(n as u32));
        }
        Err(parse_err(line, format!("invalid immediate '{}'", token)))
    }

    fn encode(&self, parsed: &[ParsedLine]) -> String {
        let mut out = String::new();
        for entry in parsed {
            match entry {
                ParsedLine::Address { value, .. } => {
                    out.push_str(&format!("address {:016b}\n", value));
                }
                ParsedLine::Instruction {
                    mnemonic,
                    operands,
                    ..
                } => {
                    out.push_str(&format!("{:032b}\n", encode_instruction(mnemonic, operands)));
                }
            }
        }
        out
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_comment(line: &str) -> &str {
    let hash = line.find('#');
    let slashes = line.find("//");
    match (hash, slashes) {
        (Some(h), Some(s)) => &line[..h.min(s)],
        (Some(h), None) => &line[..h],
        (None, Some(s)) => &line[..s],
        (None, None) => line,
    }
}

fn parse_bit_string(token: &str) -> Option<u32> {
    if token.is_empty() || token.len() > 32 || !token.bytes().all(|b| b == b'0' || b == b'1') {
        return None;
    }
    u32::from_str_radix(token, 2).ok()
}

fn parse_err(line: usize, reason: impl Into<String>) -> SimError {
    SimError::Parse {
        line,
        reason: reason.into(),
    }
}

fn reg(operands: &[Operand], i: usize) -> u32 {
    match operands.get(i) {
        Some(Operand::Register(r)) => u32::from(*r),
        _ => 0,
    }
}

fn imm(operands: &[Operand], i: usize) -> u32 {
    match operands.get(i) {
        Some(Operand::Immediate(v)) => *v,
        _ => 0,
    }
}

fn word(opcode: u8, a: u32, b: u32, c: u32) -> u32 {
    (u32::from(opcode) << 24) | ((a & 0xFF) << 16) | ((b & 0xFF) << 8) | (c & 0xFF)
}

/// Encode one validated mnemonic + operand list into its 32-bit row, per
/// the type table in §4.D. `parse` rejects unknown mnemonics and wrong
/// operand counts before this is ever called.
fn encode_instruction(mnemonic: &str, operands: &[Operand]) -> u32 {
    match mnemonic {
        "HALT" => 0xFFFF_FFFF,
        "NOP" => word(0x27, 0, 0, 0),
        // R_R_R: op rc, ra, rb
        "ADD" => word(0x01, reg(operands, 1), reg(operands, 2), reg(operands, 0)),
        "SUB" => word(0x02, reg(operands, 1), reg(operands, 2), reg(operands, 0)),
        "XOR" => word(0x04, reg(operands, 1), reg(operands, 2), reg(operands, 0)),
        "OR" => word(0x05, reg(operands, 1), reg(operands, 2), reg(operands, 0)),
        "AND" => word(0x07, reg(operands, 1), reg(operands, 2), reg(operands, 0)),
        "ASL" => word(0x08, reg(operands, 1), reg(operands, 2), reg(operands, 0)),
        "ASR" => word(0x09, reg(operands, 1), reg(operands, 2), reg(operands, 0)),
        "LSL" => word(0x0A, reg(operands, 1), reg(operands, 2), reg(operands, 0)),
        "LSR" => word(0x0B, reg(operands, 1), reg(operands, 2), reg(operands, 0)),
        "MUL" => word(0x20, reg(operands, 1), reg(operands, 2), reg(operands, 0)),
        "DIV" => word(0x21, reg(operands, 1), reg(operands, 2), reg(operands, 0)),
        "MOD" => word(0x22, reg(operands, 1), reg(operands, 2), reg(operands, 0)),
        "NOTBIT" => word(0x26, reg(operands, 1), reg(operands, 2), reg(operands, 0)),
        // R_R: op rc, ra
        "NOT" | "PASSNOTA" => word(0x06, reg(operands, 1), 0, reg(operands, 0)),
        "COPY" | "PASSA" => word(0x0C, reg(operands, 1), 0, reg(operands, 0)),
        "INC" => word(0x23, reg(operands, 1), 0, reg(operands, 0)),
        "DEC" => word(0x24, reg(operands, 1), 0, reg(operands, 0)),
        "LOAD" => word(0x10, reg(operands, 1), 0, reg(operands, 0)),
        "STORE" => word(0x11, reg(operands, 1), 0, reg(operands, 0)),
        // R: op rc
        "ZEROS" => word(0x03, 0, 0, reg(operands, 0)),
        "JR" => word(0x13, 0, 0, reg(operands, 0)),
        // CONST: op rc, imm16
        "LCLH" => {
            let v = imm(operands, 1);
            word(0x0E, (v >> 8) & 0xFF, v & 0xFF, reg(operands, 0))
        }
        "LCLL" => {
            let v = imm(operands, 1);
            word(0x0F, (v >> 8) & 0xFF, v & 0xFF, reg(operands, 0))
        }
        "MOVI" => {
            let v = imm(operands, 1);
            word(0x25, (v >> 8) & 0xFF, v & 0xFF, reg(operands, 0))
        }
        // BRANCH: op ra, rb, imm8
        "BEQ" => word(0x14, reg(operands, 0), reg(operands, 1), imm(operands, 2)),
        "BNE" => word(0x15, reg(operands, 0), reg(operands, 1), imm(operands, 2)),
        // J: op imm24
        "J" => {
            let v = imm(operands, 0);
            word(0x16, (v >> 16) & 0xFF, (v >> 8) & 0xFF, v & 0xFF)
        }
        "JAL" => {
            let v = imm(operands, 0);
            word(0x12, (v >> 16) & 0xFF, (v >> 8) & 0xFF, v & 0xFF)
        }
        _ => unreachable!("parse validates mnemonic membership before encoding"),
    }
}
