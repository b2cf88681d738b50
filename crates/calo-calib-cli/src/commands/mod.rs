pub mod inspect;
pub mod model_info;
pub mod run;
