pub mod trajectory;
pub mod xyz;
