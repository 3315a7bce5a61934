// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Opaque numeric handles assigned by the catalog.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

macro_rules! define_oid {
	($name:ident) => {
		#[repr(transparent)]
		#[derive(
			Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
		)]
		#[serde(transparent)]
		pub struct $name(pub u32);

		impl Display for $name {
			fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<u32> for $name {
			fn from(value: u32) -> Self {
				Self(value)
			}
		}
	};
}

define_oid!(TableOid);
define_oid!(ColumnOid);
define_oid!(IndexOid);
