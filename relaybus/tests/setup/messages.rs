/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */
#![allow(unused)]

use relaybus::prelude::*;

/// Starts a test saga.
#[bus_message]
pub struct StartTest {
    pub correlation_id: Uuid,
    pub key: String,
}

/// Published by the saga once started.
#[bus_message]
pub struct TestStarted {
    pub correlation_id: Uuid,
    pub key: String,
}

/// Finishes a test saga; correlates on `test_id`.
#[bus_message]
pub struct UpdateTest {
    pub test_id: Uuid,
}

/// Published by the saga when it finishes.
#[bus_message]
pub struct TestUpdated {
    pub correlation_id: Uuid,
}

/// Touches every active saga carrying `key`.
#[bus_message]
pub struct TouchByKey {
    pub key: String,
}

#[bus_message]
pub struct Ping(pub u32);

#[bus_message(serde)]
#[derive(PartialEq)]
pub struct Reminder {
    pub text: String,
}
