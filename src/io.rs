use std::fs;
use std::path::Path;

use crate::constants::*;
use crate::error::{Result, SimError};
use crate::memory::{AddressSpace, Vma};
use crate::pager::{Algorithm, RandomSequence};
use crate::vm_manager::Instruction;

/// Everything the input file describes: each process's VMAs and the instruction stream
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InputData {
    pub processes: Vec<Vec<Vma>>,
    pub instructions: Vec<Instruction>,
}

/// Non-comment lines with their 1-based line numbers
fn content_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

fn parse_number<T: std::str::FromStr>(token: &str, line: usize, what: &str) -> Result<T> {
    token
        .parse()
        .map_err(|_| SimError::parse(line, format!("Invalid {}: {}", what, token)))
}

fn parse_flag(token: &str, line: usize, what: &str) -> Result<bool> {
    match token {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(SimError::parse(line, format!("Invalid {} flag: {}", what, token))),
    }
}

fn check_page(page: usize, line: usize) -> Result<usize> {
    if page >= PAGE_TABLE_SIZE {
        return Err(SimError::parse(
            line,
            format!("Page number {} exceeds max {}", page, PAGE_TABLE_SIZE - 1),
        ));
    }
    Ok(page)
}

impl InputData {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|source| SimError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content_lines(content);

        let (line_no, line) = lines
            .next()
            .ok_or_else(|| SimError::parse(0, "Input file is empty"))?;
        let process_count: usize = parse_number(line, line_no, "process count")?;

        let mut processes = Vec::with_capacity(process_count);
        for p in 0..process_count {
            let (line_no, line) = lines
                .next()
                .ok_or_else(|| SimError::parse(line_no, format!("Missing VMA count for process {}", p)))?;
            let vma_count: usize = parse_number(line, line_no, "VMA count")?;

            let mut vmas = Vec::with_capacity(vma_count);
            for _ in 0..vma_count {
                let (line_no, line) = lines
                    .next()
                    .ok_or_else(|| SimError::parse(line_no, format!("Missing VMA for process {}", p)))?;
                vmas.push(Self::parse_vma_line(line, line_no)?);
            }
            processes.push(vmas);
        }

        let mut instructions = Vec::new();
        let mut switched = false;
        for (line_no, line) in lines {
            let instr = Self::parse_instruction_line(line, line_no, process_count)?;
            match instr {
                Instruction::ContextSwitch(_) | Instruction::Exit(_) => switched = true,
                Instruction::Read(_) | Instruction::Write(_) if !switched => {
                    return Err(SimError::parse(line_no, "Memory access before any context switch"));
                }
                _ => {}
            }
            instructions.push(instr);
        }

        Ok(InputData { processes, instructions })
    }

    fn parse_vma_line(line: &str, line_no: usize) -> Result<Vma> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 4 {
            return Err(SimError::parse(
                line_no,
                format!("VMA line has {} tokens, expected 4", tokens.len()),
            ));
        }
        let start = check_page(parse_number(tokens[0], line_no, "start page")?, line_no)?;
        let end = check_page(parse_number(tokens[1], line_no, "end page")?, line_no)?;
        if start > end {
            return Err(SimError::parse(line_no, format!("VMA start {} is after end {}", start, end)));
        }
        let write_protected = parse_flag(tokens[2], line_no, "write_protected")?;
        let file_mapped = parse_flag(tokens[3], line_no, "file_mapped")?;
        Ok(Vma::new(start, end, write_protected, file_mapped))
    }

    fn parse_instruction_line(line: &str, line_no: usize, process_count: usize) -> Result<Instruction> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 2 {
            return Err(SimError::parse(
                line_no,
                format!("Instruction has {} tokens, expected 2", tokens.len()),
            ));
        }
        let arg: usize = parse_number(tokens[1], line_no, "instruction argument")?;
        let check_process = |id: usize| {
            if id >= process_count {
                Err(SimError::parse(line_no, format!("Process {} does not exist", id)))
            } else {
                Ok(id)
            }
        };
        match tokens[0] {
            "c" => Ok(Instruction::ContextSwitch(check_process(arg)?)),
            "e" => Ok(Instruction::Exit(check_process(arg)?)),
            "r" => Ok(Instruction::Read(check_page(arg, line_no)?)),
            "w" => Ok(Instruction::Write(check_page(arg, line_no)?)),
            other => Err(SimError::parse(line_no, format!("Unknown instruction: {}", other))),
        }
    }

    /// Fresh address spaces, ids in file order
    pub fn address_spaces(&self) -> Vec<AddressSpace> {
        self.processes
            .iter()
            .enumerate()
            .map(|(id, vmas)| AddressSpace::new(id, vmas.clone()))
            .collect()
    }
}

impl RandomSequence {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|source| SimError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// A count followed by at least that many values; extra values are ignored
    pub fn parse(content: &str) -> Result<Self> {
        let mut tokens = content
            .lines()
            .enumerate()
            .flat_map(|(idx, line)| line.split_whitespace().map(move |token| (idx + 1, token)));
        let count: usize = match tokens.next() {
            Some((line_no, token)) => parse_number(token, line_no, "random number count")?,
            None => return Err(SimError::MissingRandomNumbers),
        };
        let values = tokens
            .take(count)
            .map(|(line_no, token)| parse_number(token, line_no, "random number"))
            .collect::<Result<Vec<u32>>>()?;
        if values.len() < count {
            return Err(SimError::parse(
                content.lines().count(),
                format!("Random file promises {} numbers but holds {}", count, values.len()),
            ));
        }
        RandomSequence::new(values)
    }
}

/// Random numbers for the pager. Only the Random policy reads the file.
pub fn load_random_numbers(algorithm: Algorithm, path: Option<&Path>) -> Result<Option<RandomSequence>> {
    match (algorithm, path) {
        (Algorithm::Random, Some(path)) => RandomSequence::from_file(path).map(Some),
        _ => Ok(None),
    }
}
