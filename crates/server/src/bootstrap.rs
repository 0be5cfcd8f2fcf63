// Startup provisioning: search indices first, then the evidence store project.

use std::sync::Arc;

use provenance_common::types::Project;
use thiserror::Error;
use tracing::{info, info_span, Instrument};

use crate::search::{
    IndexError, IndexManager, GENERIC_RESOURCES_KIND, GENERIC_RESOURCE_VERSIONS_KIND,
};
use crate::store::{ProjectStore, StoreError};

pub const INDEX_KINDS: [&str; 2] = [GENERIC_RESOURCES_KIND, GENERIC_RESOURCE_VERSIONS_KIND];

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("error initializing index {index}: {source}")]
    Index {
        index: String,
        #[source]
        source: IndexError,
    },

    #[error("error fetching project {project}: {source}")]
    FetchProject {
        project: String,
        #[source]
        source: StoreError,
    },

    #[error("error creating project {project}: {source}")]
    CreateProject {
        project: String,
        #[source]
        source: StoreError,
    },
}

pub struct Bootstrap {
    indices: Arc<dyn IndexManager>,
    projects: Arc<dyn ProjectStore>,
    project: String,
}

impl Bootstrap {
    pub fn new(
        indices: Arc<dyn IndexManager>,
        projects: Arc<dyn ProjectStore>,
        project: impl Into<String>,
    ) -> Self {
        Self { indices, projects, project: project.into() }
    }

    /// Every step is an "ensure"; re-running against provisioned state is a no-op.
    pub async fn run(&self) -> Result<(), BootstrapError> {
        self.provision()
            .instrument(info_span!("provenance.bootstrap.run", project = %self.project))
            .await
    }

    async fn provision(&self) -> Result<(), BootstrapError> {
        for kind in INDEX_KINDS {
            let index = self.indices.index_name(kind);
            let alias = self.indices.alias_name(kind);
            self.indices
                .ensure_index(&index, &alias, kind)
                .await
                .map_err(|source| BootstrapError::Index { index: index.clone(), source })?;
            info!(%index, %alias, "index ready");
        }

        self.ensure_project().await
    }

    async fn ensure_project(&self) -> Result<(), BootstrapError> {
        match self.projects.get_project(&self.project).await {
            Ok(_) => {
                info!("project already exists");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => {
                self.projects
                    .create_project(Project { name: self.project.clone() })
                    .await
                    .map_err(|source| BootstrapError::CreateProject {
                        project: self.project.clone(),
                        source,
                    })?;
                info!("created project");
                Ok(())
            }
            Err(source) => {
                Err(BootstrapError::FetchProject { project: self.project.clone(), source })
            }
        }
    }
}
