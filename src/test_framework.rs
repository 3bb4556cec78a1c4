//! In-kernel test harness. Grounded on the teacher's `test_framework.rs`:
//! the same `TestRunner`/`TestResult`/assertion-macro shape, with the
//! ARM64-specific cycle-counter and syscall-argument helpers dropped (no
//! syscall ABI or PMU access exists in this crate) and QEMU exit replaced
//! by a halt loop, since this spec names no automated exit mechanism.

use crate::{print, println};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestResult {
    Passed,
    Failed,
}

pub struct TestRunner {
    test_count: usize,
    passed: usize,
    failed: usize,
}

impl TestRunner {
    pub fn new() -> Self {
        TestRunner {
            test_count: 0,
            passed: 0,
            failed: 0,
        }
    }

    pub fn run_test<F>(&mut self, name: &str, test_fn: F) -> TestResult
    where
        F: FnOnce() -> TestResult,
    {
        self.test_count += 1;
        print!("Running test: {} ... ", name);
        let result = test_fn();
        match result {
            TestResult::Passed => {
                self.passed += 1;
                println!("PASSED");
            }
            TestResult::Failed => {
                self.failed += 1;
                println!("FAILED");
            }
        }
        result
    }

    pub fn summary(&self) {
        println!("\n=== Test Summary ===");
        println!("Total tests: {}", self.test_count);
        println!("Passed: {}", self.passed);
        println!("Failed: {}", self.failed);
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

#[macro_export]
macro_rules! assert_test {
    ($condition:expr) => {
        if !$condition {
            $crate::println!("assertion failed: {}", stringify!($condition));
            return $crate::test_framework::TestResult::Failed;
        }
    };
}

#[macro_export]
macro_rules! assert_eq_test {
    ($left:expr, $right:expr) => {
        if $left != $right {
            $crate::println!("assertion failed: {} != {}", stringify!($left), stringify!($right));
            return $crate::test_framework::TestResult::Failed;
        }
    };
}

/// The `#[test_case]` runner wired up via `#![test_runner(...)]` for the
/// `not(test)` (bare-metal) build. Each test is a plain `fn()`; failure is
/// reported through a panic, which the installed panic handler turns into
/// a halt, so reaching the final summary line means everything passed.
#[cfg(not(test))]
pub fn test_runner(tests: &[&dyn Fn()]) {
    println!("running {} tests", tests.len());
    for test in tests {
        test();
    }
    println!("test result: ok. {} passed", tests.len());
}
