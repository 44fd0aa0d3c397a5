use std::{path::Path, fs, io};

use enum_dispatch::enum_dispatch;
use serde::{Serialize, de::DeserializeOwned};

pub type SaveResult = Result<(), String>;
pub type LoadResult = Result<(), String>;

// ----------------------------------------------
// Save / Load Traits
// ----------------------------------------------

pub trait Save {
    fn pre_save(&mut self) {
    }

    fn save(&self, _state: &mut SaveStateImpl) -> SaveResult {
        Ok(())
    }

    fn post_save(&mut self) {
    }
}

pub trait Load {
    fn pre_load(&mut self) {
    }

    fn load(&mut self, _state: &SaveStateImpl) -> LoadResult {
        Ok(())
    }

    fn post_load(&mut self) {
    }
}

// ----------------------------------------------
// SaveState
// ----------------------------------------------

#[enum_dispatch(SaveStateImpl)]
pub trait SaveState {
    fn save<T>(&mut self, instance: &T) -> SaveResult
        where T: Serialize;

    fn load<T>(&self, instance: &mut T) -> LoadResult
        where T: DeserializeOwned;

    fn load_new_instance<T>(&self) -> Result<T, String>
        where T: DeserializeOwned;

    fn read_file<P>(&mut self, path: P) -> io::Result<()>
        where P: AsRef<Path>;

    fn write_file<P>(&self, path: P) -> io::Result<()>
        where P: AsRef<Path>;
}

#[enum_dispatch]
pub enum SaveStateImpl {
    Json(JsonSaveState),
}

impl SaveStateImpl {
    #[inline]
    pub fn new_json(pretty_print: bool) -> Self {
        Self::Json(JsonSaveState::new(pretty_print))
    }
}

// ----------------------------------------------
// Whole-object drivers
// ----------------------------------------------

// Runs the full save sequence (pre_save, save, post_save) and writes
// the result out.
pub fn save_to_file<T, P>(object: &mut T, state: &mut SaveStateImpl, path: P) -> SaveResult
    where T: Save,
          P: AsRef<Path>
{
    object.pre_save();
    object.save(state)?;
    object.post_save();

    state.write_file(&path)
        .map_err(|err| format!("Failed to write '{}': {err}", path.as_ref().display()))
}

// Reads the file and runs the full load sequence (pre_load, load,
// post_load) on an existing object.
pub fn load_from_file<T, P>(object: &mut T, state: &mut SaveStateImpl, path: P) -> LoadResult
    where T: Load,
          P: AsRef<Path>
{
    state.read_file(&path)
        .map_err(|err| format!("Failed to read '{}': {err}", path.as_ref().display()))?;

    object.pre_load();
    object.load(state)?;
    object.post_load();
    Ok(())
}

// ----------------------------------------------
// JsonSaveState
// ----------------------------------------------

pub struct JsonSaveState {
    pretty_print: bool,
    text: String,
}

impl JsonSaveState {
    pub fn new(pretty_print: bool) -> Self {
        Self {
            pretty_print,
            text: String::new(),
        }
    }

    // The serialized JSON from the last save() or read_file().
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn clear(&mut self) {
        self.text.clear();
    }
}

impl SaveState for JsonSaveState {
    fn save<T>(&mut self, instance: &T) -> SaveResult
        where T: Serialize
    {
        let result = {
            if self.pretty_print {
                serde_json::to_string_pretty(instance)
            } else {
                serde_json::to_string(instance)
            }
        };

        self.text = result.map_err(|err| format!("JSON serialize failed: {err}"))?;
        Ok(())
    }

    fn load<T>(&self, instance: &mut T) -> LoadResult
        where T: DeserializeOwned
    {
        // Load in place:
        *instance = self.load_new_instance()?;
        Ok(())
    }

    fn load_new_instance<T>(&self) -> Result<T, String>
        where T: DeserializeOwned
    {
        if self.text.is_empty() {
            return Err("JsonSaveState is empty; nothing to load.".into());
        }

        serde_json::from_str::<T>(&self.text)
            .map_err(|err| format!("JSON parse failed: {err}"))
    }

    fn read_file<P>(&mut self, path: P) -> io::Result<()>
        where P: AsRef<Path>
    {
        self.text = fs::read_to_string(path)?;
        Ok(())
    }

    fn write_file<P>(&self, path: P) -> io::Result<()>
        where P: AsRef<Path>
    {
        fs::write(path, &self.text)
    }
}

// ----------------------------------------------
// Unit Tests
// ----------------------------------------------
