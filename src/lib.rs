pub mod config;

pub mod domain {
    pub mod entities {
        pub mod query;
        pub mod records;
        pub mod resource;
    }
    pub mod schema {
        pub mod filters;
        pub mod formatters;
        pub mod registry;
    }
}

pub mod usecase {
    pub mod ports {
        pub mod gateway;
        pub mod hooks;
        pub mod view;
    }
    pub mod services {
        pub mod debounce;
        pub mod default_renderer;
        pub mod export_service;
        pub mod import_service;
        pub mod normalize;
        pub mod query_controller;
        pub mod resource_hooks;
    }
}

pub mod infra {
    pub mod sqlite {
        pub mod gateway;
        pub mod queries;
        pub mod schema;
    }
    pub mod import {
        pub mod csv;
        pub mod roster;
        pub mod xlsx;
    }
    pub mod export {
        pub mod csv;
    }
}

pub mod platform {
    pub mod desktop {
        pub mod blocking;
    }
}

pub mod ui {
    pub mod app;
    pub mod renderers;
    pub mod state {
        pub mod app_state;
    }
}

#[cfg(test)]
mod tests;
