mod common;
mod household;
mod lookup;
mod store;
