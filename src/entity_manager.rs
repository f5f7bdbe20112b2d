use std::sync::Arc;

use crate::crud::CrudOperations;

/// Hands out the CRUD instance a repository works through.
#[derive(Clone)]
pub struct EntityManager {
    crud: Arc<dyn CrudOperations>,
}

impl EntityManager {
    pub fn new(crud: Arc<dyn CrudOperations>) -> Self {
        Self { crud }
    }

    pub fn crud(&self) -> &Arc<dyn CrudOperations> {
        &self.crud
    }
}
