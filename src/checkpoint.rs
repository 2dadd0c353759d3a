use crate::composite::CompositeModel;
use crate::error::{CpinnError, Result};
use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;
use log::info;
use std::path::{Path, PathBuf};

/// これまでで最良の全体損失と、それを記録したエポック。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CheckpointRecord {
    pub epoch: usize,
    pub loss: f32,
}

/// 複合モデルのパラメータを永続化する先。
pub trait Persistence<B: Backend> {
    /// モデルの全パラメータを書き出し、書き出したパスを返します。
    fn save_state(&mut self, model: &CompositeModel<B>) -> Result<PathBuf>;
}

/// `burn` の MessagePack 形式でファイルに保存します。
///
/// パラメータのキーは部分ネットワークの番号で名前空間が分かれます。
#[derive(Clone, Debug)]
pub struct FileCheckpointer {
    path: PathBuf,
}

impl FileCheckpointer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 実際に書き出されるファイルのパス（拡張子は `.mpk`）。
    pub fn path(&self) -> PathBuf {
        self.path.with_extension("mpk")
    }
}

impl<B: Backend> Persistence<B> for FileCheckpointer {
    fn save_state(&mut self, model: &CompositeModel<B>) -> Result<PathBuf> {
        let path = self.path();
        model
            .models_record()
            .save_file(
                &self.path,
                &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            )
            .map_err(|e| CpinnError::PersistenceFailure {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        Ok(path)
    }
}

/// 保存済みのパラメータを `model` に読み込みます。
///
/// `model` は保存時と同じ設定で構築しておく必要があります。
pub fn load_state<B: Backend>(model: CompositeModel<B>, path: &Path) -> Result<CompositeModel<B>> {
    let file = path.with_extension("mpk");
    if !file.exists() {
        return Err(CpinnError::PersistenceFailure {
            path: file,
            reason: "ファイルが見つかりません".to_string(),
        });
    }
    let device = model.device().clone();
    let models = model
        .models_record()
        .load_file(
            path,
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            &device,
        )
        .map_err(|e| CpinnError::PersistenceFailure {
            path: file,
            reason: e.to_string(),
        })?;
    Ok(model.with_models(models))
}

/// 全体損失が真に改善したときだけ保存し、最良の記録を保持します。
#[derive(Debug)]
pub struct BestCheckpoint<P> {
    persistence: P,
    best: Option<CheckpointRecord>,
}

impl<P> BestCheckpoint<P> {
    pub fn new(persistence: P) -> Self {
        Self {
            persistence,
            best: None,
        }
    }

    pub fn best(&self) -> Option<CheckpointRecord> {
        self.best
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    /// エポックの全体損失を観測します。改善していれば保存してパスを返します。
    pub fn observe<B>(&mut self, epoch: usize, loss: f32, model: &CompositeModel<B>) -> Result<Option<PathBuf>>
    where
        B: Backend,
        P: Persistence<B>,
    {
        if !self.best.is_none_or(|best| loss < best.loss) {
            return Ok(None);
        }
        let path = self.persistence.save_state(model)?;
        self.best = Some(CheckpointRecord { epoch, loss });
        info!(".......モデルを更新しました (epoch = {epoch}, loss = {loss:.6})");
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::to_host;
    use crate::derivative::InputPoints;
    use crate::domain::DomainLayout;
    use crate::model::SubModelConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[derive(Default)]
    struct CountingPersistence {
        saves: usize,
    }

    impl<B: Backend> Persistence<B> for CountingPersistence {
        fn save_state(&mut self, _model: &CompositeModel<B>) -> Result<PathBuf> {
            self.saves += 1;
            Ok(PathBuf::from(format!("checkpoint-{}", self.saves)))
        }
    }

    fn composite() -> CompositeModel<TestBackend> {
        let device = Default::default();
        let layout = DomainLayout::new(2, -1.0, 1.0, 0.0).unwrap();
        CompositeModel::new(layout, &SubModelConfig::new(), &device)
    }

    #[test]
    fn recorded_loss_is_the_running_minimum() {
        let model = composite();
        let mut checkpoint = BestCheckpoint::new(CountingPersistence::default());
        let losses = [5.0, 3.0, 4.0, 3.0, 1.0, 2.0, 0.5, 0.5, 0.7];
        let mut running_min = f32::INFINITY;
        let mut improvements = 0;

        for (epoch, &loss) in losses.iter().enumerate() {
            let saved = checkpoint.observe(epoch + 1, loss, &model).unwrap();
            if loss < running_min {
                running_min = loss;
                improvements += 1;
                assert!(saved.is_some());
            } else {
                assert!(saved.is_none());
            }
            assert_eq!(checkpoint.best().unwrap().loss, running_min);
        }
        assert_eq!(checkpoint.persistence().saves, improvements);
        assert_eq!(checkpoint.best().unwrap().epoch, 7);
    }

    #[test]
    fn saved_parameters_round_trip() {
        let model = composite();
        let path = std::env::temp_dir().join(format!("cpinn-checkpoint-{}", std::process::id()));
        let mut persistence = FileCheckpointer::new(&path);
        let written = Persistence::<TestBackend>::save_state(&mut persistence, &model).unwrap();
        assert_eq!(written, path.with_extension("mpk"));

        let restored = load_state(composite(), &path).unwrap();
        std::fs::remove_file(&written).ok();

        let points = InputPoints::<TestBackend>::from_slice(&[-0.8, 0.0, 0.6], model.device());
        for (a, b) in model
            .evaluate_separately(points.values())
            .into_iter()
            .zip(restored.evaluate_separately(points.values()))
        {
            assert_eq!(to_host(a), to_host(b));
        }
    }

    #[test]
    fn loading_a_missing_file_fails() {
        let result = load_state(composite(), Path::new("/nonexistent/cpinn-model"));
        assert!(matches!(result, Err(CpinnError::PersistenceFailure { .. })));
    }
}
