//! Real-time virtual try-on: face landmark detection, overlay placement and
//! rendering, and the engine that drives them per frame.

pub mod shared {
    pub mod constants;
    pub mod frame;
    pub mod model_resolver;
    pub mod surface;
}

pub mod detection {
    pub mod domain {
        pub mod face_landmarks;
        pub mod frame_source;
        pub mod landmark_detector;
        pub mod landmark_model;
    }
    pub mod infrastructure;
}

pub mod placement {
    pub mod domain {
        pub mod ar_settings;
        pub mod ar_transform;
        pub mod transform_calculator;
    }
}

pub mod rendering {
    pub mod domain {
        pub mod ar_product;
        pub mod asset_loader;
        pub mod overlay_renderer;
        pub mod render_context;
        pub mod scene;
        pub mod scene_stage;
    }
    pub mod infrastructure;
}

pub mod imaging {
    pub mod domain {
        pub mod image_reader;
        pub mod image_writer;
    }
    pub mod infrastructure;
}

pub mod engine {
    pub mod ar_engine;
    pub mod engine_config;
    pub mod engine_state;
    pub mod fps_counter;
    pub mod frame_loop;
    pub mod frame_scheduler;
    pub mod loop_logger;
}

pub mod pipeline {
    pub mod try_on_image_use_case;
}
