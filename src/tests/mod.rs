// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Integration Tests
//!
//! This module contains integration tests for the object layer.
//! These tests verify that the handle arena, the handle lifecycle and
//! ports work together correctly, including across threads.

mod lifecycle_tests;
mod prop_tests;
