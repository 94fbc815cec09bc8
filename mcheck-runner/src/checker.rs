//! Ordered conformance checks
//!
//! The checker walks a fixed list of steps against a live server. Each step
//! relies on the state the previous one left behind, so the run stops at the
//! first failure and reports that step. Steps are reported as they finish.

use crate::error::CheckError;
use mcheck_core::config::CheckConfig;
use mcheck_core::{CacheClient, CacheError, CheckResult, Item, Operation, Reporter};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const KEY_SET: &str = "key_set";
pub const KEY_ADD: &str = "key_add";
pub const KEY_NUMBER: &str = "key_number";
pub const KEY_TOUCH: &str = "key_touch";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOptions {
    /// Flush the server before the first write.
    pub flush: bool,
    /// TTL in seconds given to the expiring key.
    pub expiry_ttl: u32,
    /// Real time to wait before expecting the key to be gone.
    pub expiry_wait: Duration,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            flush: false,
            expiry_ttl: 2,
            expiry_wait: Duration::from_secs(3),
        }
    }
}

impl From<&CheckConfig> for CheckOptions {
    fn from(config: &CheckConfig) -> Self {
        Self {
            flush: config.flush,
            expiry_ttl: config.expiry_ttl,
            expiry_wait: config.expiry_wait(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub passed: Vec<&'static str>,
    pub elapsed: Duration,
}

type StepFn<'a, C> = fn(&Checker<'a, C>) -> Result<(), CheckError>;

struct Step<'a, C: ?Sized + 'a> {
    name: &'static str,
    run: StepFn<'a, C>,
}

impl<'a, C: ?Sized + 'a> Step<'a, C> {
    fn new(name: &'static str, run: StepFn<'a, C>) -> Self {
        Self { name, run }
    }
}

pub struct Checker<'a, C: ?Sized> {
    client: &'a C,
    options: CheckOptions,
}

impl<'a, C: CacheClient + ?Sized> Checker<'a, C> {
    pub fn new(client: &'a C, options: CheckOptions) -> Self {
        Self { client, options }
    }

    /// Names of the steps this checker will run, in order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps().iter().map(|step| step.name).collect()
    }

    fn steps(&self) -> Vec<Step<'a, C>> {
        let mut steps = vec![Step::new("Ping", Self::check_ping)];
        if self.options.flush {
            steps.push(Step::new("Flush", Self::check_flush));
        }
        steps.push(Step::new("Set", Self::check_set));
        steps.push(Step::new("Add", Self::check_add));
        steps.push(Step::new("Replace", Self::check_replace));
        steps.push(Step::new("Get", Self::check_get));
        steps.push(Step::new("Gets", Self::check_get_multi));
        steps.push(Step::new("Append", Self::check_append));
        steps.push(Step::new("Prepend", Self::check_prepend));
        steps.push(Step::new("Increment", Self::check_increment));
        steps.push(Step::new("Decrement", Self::check_decrement));
        steps.push(Step::new("Touch", Self::check_touch));
        steps.push(Step::new("FlushAll", Self::check_flush_all));
        steps
    }

    /// Runs every step in order, stopping at the first failure.
    pub fn run(&self, reporter: &mut dyn Reporter) -> Result<CheckSummary, CheckError> {
        let started = Instant::now();
        let mut passed = Vec::new();

        for step in self.steps() {
            debug!(step = step.name, "Running check");
            if let Err(e) = (step.run)(self) {
                warn!(step = step.name, "Check failed: {}", e);
                reporter.report(&CheckResult::fail(step.name, e.to_string()));
                return Err(e);
            }
            reporter.report(&CheckResult::pass(step.name));
            passed.push(step.name);
        }

        let elapsed = started.elapsed();
        info!("All {} checks passed in {:?}", passed.len(), elapsed);
        Ok(CheckSummary { passed, elapsed })
    }

    fn check_ping(&self) -> Result<(), CheckError> {
        self.client.ping().map_err(CheckError::Connectivity)
    }

    fn check_flush(&self) -> Result<(), CheckError> {
        call("Flush", Operation::FlushAll, self.client.flush_all())
    }

    fn check_set(&self) -> Result<(), CheckError> {
        call("Set", Operation::Set, self.client.set(&Item::new(KEY_SET, "value_set")))?;
        self.expect_value("Set", KEY_SET, "value_set")
    }

    fn check_add(&self) -> Result<(), CheckError> {
        call("Add", Operation::Add, self.client.add(&Item::new(KEY_ADD, "value_add")))?;
        self.expect_value("Add", KEY_ADD, "value_add")
    }

    fn check_replace(&self) -> Result<(), CheckError> {
        call(
            "Replace",
            Operation::Replace,
            self.client.replace(&Item::new(KEY_SET, "value_replaced")),
        )?;
        self.expect_value("Replace", KEY_SET, "value_replaced")
    }

    fn check_get(&self) -> Result<(), CheckError> {
        self.expect_value("Get", KEY_SET, "value_replaced")
    }

    fn check_get_multi(&self) -> Result<(), CheckError> {
        let items = call(
            "Gets",
            Operation::GetMulti,
            self.client.get_multi(&[KEY_SET, KEY_ADD]),
        )?;
        if items.len() != 2 {
            return Err(CheckError::EntryCount {
                step: "Gets",
                expected: 2,
                actual: items.len(),
            });
        }

        for (key, expected) in [(KEY_SET, "value_replaced"), (KEY_ADD, "value_add")] {
            let actual = items.get(key).ok_or(CheckError::Operation {
                step: "Gets",
                op: Operation::GetMulti,
                source: CacheError::CacheMiss,
            })?;
            compare("Gets", key, expected, actual)?;
        }
        Ok(())
    }

    fn check_append(&self) -> Result<(), CheckError> {
        call("Append", Operation::Append, self.client.append(KEY_SET, b"_appended"))?;
        self.expect_value("Append", KEY_SET, "value_replaced_appended")
    }

    fn check_prepend(&self) -> Result<(), CheckError> {
        call("Prepend", Operation::Prepend, self.client.prepend(KEY_SET, b"prepended_"))?;
        self.expect_value("Prepend", KEY_SET, "prepended_value_replaced_appended")
    }

    fn check_increment(&self) -> Result<(), CheckError> {
        call("Increment", Operation::Set, self.client.set(&Item::new(KEY_NUMBER, "1")))?;
        let value = call("Increment", Operation::Increment, self.client.increment(KEY_NUMBER, 1))?;
        compare("Increment", KEY_NUMBER, "2", value.to_string().as_bytes())?;
        self.expect_value("Increment", KEY_NUMBER, "2")
    }

    fn check_decrement(&self) -> Result<(), CheckError> {
        let value = call("Decrement", Operation::Decrement, self.client.decrement(KEY_NUMBER, 1))?;
        compare("Decrement", KEY_NUMBER, "1", value.to_string().as_bytes())?;
        self.expect_value("Decrement", KEY_NUMBER, "1")
    }

    fn check_touch(&self) -> Result<(), CheckError> {
        let ttl = self.options.expiry_ttl;
        call(
            "Touch",
            Operation::Set,
            self.client.set(&Item::with_ttl(KEY_TOUCH, "value_touch", ttl)),
        )?;
        call("Touch", Operation::Touch, self.client.touch(KEY_TOUCH, ttl))?;
        self.expect_value("Touch", KEY_TOUCH, "value_touch")?;

        // Eviction happens on the server clock, so this has to be a real wait.
        info!(
            "Waiting {:?} for `{}` (ttl {}s) to expire",
            self.options.expiry_wait, KEY_TOUCH, ttl
        );
        std::thread::sleep(self.options.expiry_wait);

        self.expect_miss("Touch", KEY_TOUCH)
    }

    fn check_flush_all(&self) -> Result<(), CheckError> {
        call("FlushAll", Operation::FlushAll, self.client.flush_all())?;
        let items = call(
            "FlushAll",
            Operation::GetMulti,
            self.client.get_multi(&[KEY_SET, KEY_ADD]),
        )?;
        if !items.is_empty() {
            return Err(CheckError::EntryCount {
                step: "FlushAll",
                expected: 0,
                actual: items.len(),
            });
        }
        self.expect_miss("FlushAll", KEY_SET)
    }

    fn expect_value(&self, step: &'static str, key: &str, expected: &str) -> Result<(), CheckError> {
        let actual = call(step, Operation::Get, self.client.get(key))?;
        compare(step, key, expected, &actual)
    }

    fn expect_miss(&self, step: &'static str, key: &str) -> Result<(), CheckError> {
        match self.client.get(key) {
            Err(CacheError::CacheMiss) => Ok(()),
            Ok(_) => Err(CheckError::UnexpectedHit {
                step,
                key: key.to_owned(),
            }),
            Err(source) => Err(CheckError::Operation {
                step,
                op: Operation::Get,
                source,
            }),
        }
    }
}

fn call<T>(step: &'static str, op: Operation, result: Result<T, CacheError>) -> Result<T, CheckError> {
    result.map_err(|source| CheckError::Operation { step, op, source })
}

fn compare(step: &'static str, key: &str, expected: &str, actual: &[u8]) -> Result<(), CheckError> {
    if actual == expected.as_bytes() {
        return Ok(());
    }
    Err(CheckError::ValueMismatch {
        step,
        key: key.to_owned(),
        expected: expected.to_owned(),
        actual: String::from_utf8_lossy(actual).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_reports_both_values() {
        let err = compare("Append", KEY_SET, "a_b", b"a b").unwrap_err();
        assert_eq!(
            err,
            CheckError::ValueMismatch {
                step: "Append",
                key: KEY_SET.to_owned(),
                expected: "a_b".to_owned(),
                actual: "a b".to_owned(),
            }
        );
        assert_eq!(err.step(), "Append");
    }

    #[test]
    fn test_default_options() {
        let options = CheckOptions::default();
        assert!(!options.flush);
        assert_eq!(options.expiry_ttl, 2);
        assert!(options.expiry_wait >= Duration::from_secs(u64::from(options.expiry_ttl)));
    }

    #[test]
    fn test_options_from_config() {
        let config = CheckConfig {
            flush: true,
            expiry_ttl: 1,
            expiry_wait_ms: 1500,
        };
        let options = CheckOptions::from(&config);
        assert!(options.flush);
        assert_eq!(options.expiry_wait, Duration::from_millis(1500));
    }
}
