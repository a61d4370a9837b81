// cvar.rs — dynamic variable tracking

use crate::common::com_printf;
use crate::q_shared::CVAR_NOSET;

use std::collections::HashMap;

/// A console variable.
#[derive(Clone, Debug)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub flags: i32,
    pub modified: bool,
    pub value: f32,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CvarError {
    #[error("{0} is write protected")]
    WriteProtected(String),
}

#[derive(Default)]
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    cvar_index: HashMap<String, usize>,
}

fn parse_value(s: &str) -> f32 {
    s.trim().parse::<f32>().unwrap_or(0.0)
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_var_index(&self, name: &str) -> Option<usize> {
        self.cvar_index.get(name).copied()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.cvar_index.get(name).map(|&idx| &self.cvar_vars[idx])
    }

    /// Floating-point value of a cvar. 0 if not found.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map_or(0.0, |var| var.value)
    }

    /// String value of a cvar. "" if not found.
    pub fn variable_string(&self, name: &str) -> &str {
        self.find_var(name).map_or("", |var| var.string.as_str())
    }

    pub fn variable_bool(&self, name: &str) -> bool {
        self.variable_value(name) != 0.0
    }

    /// Non-negative integer value, clamped to at least `min`.
    pub fn variable_usize(&self, name: &str, min: usize) -> usize {
        let v = self.variable_value(name);
        if v.is_finite() && v > 0.0 {
            (v as usize).max(min)
        } else {
            min
        }
    }

    /// Get or create a cvar. If it already exists the value is not
    /// changed but flags are OR'd in.
    pub fn get(&mut self, name: &str, value: &str, flags: i32) -> usize {
        if let Some(&idx) = self.cvar_index.get(name) {
            self.cvar_vars[idx].flags |= flags;
            return idx;
        }

        let idx = self.cvar_vars.len();
        self.cvar_vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            flags,
            modified: true,
            value: parse_value(value),
        });
        self.cvar_index.insert(name.to_string(), idx);
        idx
    }

    /// Set a cvar value (respects NOSET). LATCH variables are read once
    /// when a context is built, so a set only reaches the next one.
    pub fn set(&mut self, name: &str, value: &str) -> Result<usize, CvarError> {
        let idx = match self.find_var_index(name) {
            Some(idx) => idx,
            None => return Ok(self.get(name, value, 0)),
        };
        let var = &mut self.cvar_vars[idx];

        if var.flags & CVAR_NOSET != 0 {
            com_printf(&format!("{} is write protected.\n", name));
            return Err(CvarError::WriteProtected(name.to_string()));
        }

        if value == var.string {
            return Ok(idx);
        }

        var.modified = true;
        var.string = value.to_string();
        var.value = parse_value(value);
        Ok(idx)
    }

    /// Set a cvar with explicit flags.
    pub fn full_set(&mut self, name: &str, value: &str, flags: i32) -> usize {
        let idx = match self.find_var_index(name) {
            Some(idx) => idx,
            None => return self.get(name, value, flags),
        };

        let var = &mut self.cvar_vars[idx];
        var.modified = true;
        var.string = value.to_string();
        var.value = parse_value(value);
        var.flags = flags;
        idx
    }

    /// Set a cvar from a float value.
    pub fn set_value(&mut self, name: &str, value: f32) -> Result<usize, CvarError> {
        let val_str = if value == (value as i32) as f32 {
            format!("{}", value as i32)
        } else {
            format!("{}", value)
        };
        self.set(name, &val_str)
    }

    /// Clear and report the modified bit of one variable.
    pub fn take_modified(&mut self, name: &str) -> bool {
        match self.find_var_index(name) {
            Some(idx) => std::mem::take(&mut self.cvar_vars[idx].modified),
            None => false,
        }
    }

    /// Parse `+set name value` pairs from a command line.
    pub fn apply_command_line<'a, I>(&mut self, args: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut it = args.into_iter();
        while let Some(arg) = it.next() {
            if arg != "+set" {
                continue;
            }
            let (Some(name), Some(value)) = (it.next(), it.next()) else {
                com_printf("usage: +set <variable> <value>\n");
                break;
            };
            if let Err(e) = self.set(name, value) {
                log::warn!("{}", e);
            }
        }
    }
}
