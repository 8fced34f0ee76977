//! Device directory commands: list, add, remove.

use anyhow::{Result, bail};

use crate::config::Directory;

pub fn cmd_list(directory: &Directory, quiet: bool) -> Result<()> {
    if directory.list().is_empty() {
        if !quiet {
            println!("No sensors registered.");
            println!();
            println!("Add a sensor with: colorsensor add <name>");
        }
        return Ok(());
    }

    for name in directory.list() {
        println!("{}", name);
    }
    Ok(())
}

/// Register a sensor. Returns whether the directory changed.
pub fn cmd_add(directory: &mut Directory, name: &str, quiet: bool) -> Result<bool> {
    let added = directory.add(name)?;
    if !quiet {
        if added {
            println!("Added sensor '{}'", name);
        } else {
            println!("Sensor '{}' is already registered", name);
        }
    }
    Ok(added)
}

/// Unregister a sensor. Fails if the name is not registered.
pub fn cmd_remove(directory: &mut Directory, name: &str, quiet: bool) -> Result<bool> {
    if !directory.remove(name)? {
        bail!("Sensor '{}' is not registered", name);
    }
    if !quiet {
        println!("Removed sensor '{}'", name);
    }
    Ok(true)
}
