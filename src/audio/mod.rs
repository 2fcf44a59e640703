//! # Audio Module
//!
//! Núcleo de reproducción por guild: el registro de sesiones, la cola FIFO,
//! la capacidad de transporte de voz y la máquina de estados que los
//! coordina.
//!
//! ## Arquitectura
//!
//! ### [`session`] - Sesiones por guild
//! - Registro guild → sesión con mutex por guild
//! - Conexión de voz, cola pendiente y canal de anuncios de cada guild
//!
//! ### [`queue`] - Cola de tracks
//! - FIFO estricta y acotada; orden de inserción = orden de reproducción
//!
//! ### [`connection`] - Transporte de voz
//! - Trait de conexión consumido por el controlador
//! - Implementación songbird y conexión con reintentos clasificados
//!
//! ### [`controller`] - Controlador de reproducción
//! - Encolar-o-reproducir, avance por fin de stream, skip con atenuación,
//!   pausa/reanudar, stop

pub mod connection;
pub mod controller;
pub mod queue;
pub mod session;
