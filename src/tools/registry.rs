use super::executor::{CodeExecutor, Language, ProcessExecutor};
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Creates executors on demand, one per language.
pub trait ExecutorFactory: Send + Sync {
    fn create(&self, language: &str) -> Result<Box<dyn CodeExecutor>>;
}

pub struct ProcessExecutorFactory {
    working_dir: PathBuf,
    timeout: Duration,
}

impl ProcessExecutorFactory {
    pub fn new(working_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            working_dir,
            timeout,
        }
    }
}

impl ExecutorFactory for ProcessExecutorFactory {
    fn create(&self, language: &str) -> Result<Box<dyn CodeExecutor>> {
        let Some(parsed) = Language::parse(language) else {
            bail!(
                "Unsupported language: {language}. Supported languages: python, shell, javascript, applescript"
            );
        };
        Ok(Box::new(ProcessExecutor::new(
            parsed,
            self.working_dir.clone(),
            self.timeout,
        )))
    }
}

/// Session-scoped executors keyed by normalized language name. An executor
/// lives until the registry is cleared, so interpreter state carries over
/// between code units.
pub struct ExecutorRegistry {
    factory: Box<dyn ExecutorFactory>,
    executors: HashMap<String, Box<dyn CodeExecutor>>,
}

impl ExecutorRegistry {
    pub fn new(factory: Box<dyn ExecutorFactory>) -> Self {
        Self {
            factory,
            executors: HashMap::new(),
        }
    }

    pub fn with_processes(working_dir: PathBuf, timeout: Duration) -> Self {
        Self::new(Box::new(ProcessExecutorFactory::new(working_dir, timeout)))
    }

    pub fn get_or_create(&mut self, language: &str) -> Result<&mut Box<dyn CodeExecutor>> {
        let key = registry_key(language);
        if !self.executors.contains_key(&key) {
            let executor = self.factory.create(&key)?;
            self.executors.insert(key.clone(), executor);
        }
        match self.executors.get_mut(&key) {
            Some(executor) => Ok(executor),
            None => bail!("Executor for {key} disappeared from the registry"),
        }
    }

    pub fn contains(&self, language: &str) -> bool {
        self.executors.contains_key(&registry_key(language))
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Drops every executor, terminating its interpreter.
    pub fn clear(&mut self) {
        self.executors.clear();
    }
}

fn registry_key(language: &str) -> String {
    Language::parse(language)
        .map(|parsed| parsed.name().to_string())
        .unwrap_or_else(|| language.trim().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_share_one_executor() {
        let mut registry =
            ExecutorRegistry::with_processes(PathBuf::from("."), Duration::from_secs(5));
        registry.get_or_create("python").unwrap();
        registry.get_or_create("py").unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("Python3"));

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_language_is_an_error() {
        let mut registry =
            ExecutorRegistry::with_processes(PathBuf::from("."), Duration::from_secs(5));
        let error = registry.get_or_create("cobol").err().unwrap();
        assert!(error.to_string().contains("Unsupported language: cobol"));
        assert!(registry.is_empty());
    }
}
