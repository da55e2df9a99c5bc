//! Subcommands

pub mod run;
pub mod streams;

use clap::ValueEnum;

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum EntityArg {
    Works,
    Authors,
    Funders,
}

impl From<EntityArg> for flatline_openalex::Entity {
    fn from(e: EntityArg) -> Self {
        match e {
            EntityArg::Works => flatline_openalex::Entity::Works,
            EntityArg::Authors => flatline_openalex::Entity::Authors,
            EntityArg::Funders => flatline_openalex::Entity::Funders,
        }
    }
}
