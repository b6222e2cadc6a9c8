use crate::*;
use std::path::Path;

mod batch_tests;

/// Every entry handed to a [`BatchHandler`], in order. `None` is a delete.
#[derive(Debug, Default)]
pub struct Recorder {
    pub ops: Vec<(u64, Vec<u8>, Option<Vec<u8>>)>,
}

impl BatchHandler for Recorder {
    fn put(&mut self, seq: u64, key: &[u8], value: &[u8]) {
        self.ops.push((seq, key.to_vec(), Some(value.to_vec())));
    }

    fn delete(&mut self, seq: u64, key: &[u8]) {
        self.ops.push((seq, key.to_vec(), None));
    }
}

impl Recorder {
    pub fn keys(&self) -> Vec<&[u8]> {
        self.ops.iter().map(|(_, k, _)| k.as_slice()).collect()
    }
}

pub fn test_config(dir: &Path) -> config::Config {
    config::Config::new(dir)
}

/// Opens `dir`, returning the engine and whatever recovery replayed.
pub fn open(dir: &Path) -> anyhow::Result<(Engine, Recorder)> {
    open_with(test_config(dir))
}

pub fn open_with(config: config::Config) -> anyhow::Result<(Engine, Recorder)> {
    let mut rec = Recorder::default();
    let engine = Engine::open(config, &mut rec)?;
    Ok((engine, rec))
}

pub fn put(engine: &mut Engine, key: &[u8], value: &[u8]) -> anyhow::Result<()> {
    let mut batch = WriteBatch::new();
    batch.put(key, value);
    engine.write(&mut batch)
}

/// Names of the files in `dir`, sorted.
pub fn list(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}
